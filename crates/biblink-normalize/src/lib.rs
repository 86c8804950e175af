//! BibLink Normalize - Identifier validation and canonical formatting
//!
//! Every raw value goes through the same stages:
//! 1. control characters are stripped (replaced by a space for titles)
//! 2. optional user-defined replacement rules run, then spaces collapse
//! 3. the kind-specific grammar or checksum decides validity and the canonical form
//!
//! The canonical forms are what the pipeline compares across repositories,
//! so two spellings of the same identifier must format identically.
//!
//! Author: hephaex@gmail.com

mod arxiv;
pub mod checksum;
mod doi;
mod lccn;
pub mod replace;

pub use replace::{apply_rules, collapse_spaces, RuleSet};

use biblink_core::{FormatResult, IdentifierKind, ReplacementRules, StringReplacementRule};

// ============================================================================
// Character Classes
// ============================================================================

/// Symbols replaced by a space in titles
const TITLE_SYMBOLS: [&str; 42] = [
    "’", "[", "]", "(", ")", "{", "}", "‒", "–", "—", "―", "‐", "-", "‹", "›", "«", "»", "`", "‘",
    "’", "“", "”", "/", ",", ".", "~", "©", "℗", "®", "℠", "™", "_", ":", "|", ";", "¿", "?", "€",
    "$", "'", "\\", "\"",
];

/// C0 and C1 control characters
fn is_control(c: char) -> bool {
    matches!(c as u32, 0x00..=0x1F | 0x80..=0x9F)
}

/// Replace every C0/C1 control character with `replacement`
pub fn replace_control_chars(input: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if is_control(c) {
            out.push_str(replacement);
        } else {
            out.push(c);
        }
    }
    out
}

/// Split on `separator`, dropping trailing empty pieces
///
/// An empty input yields one empty piece; an input made only of
/// separators yields none.
pub(crate) fn split_dropping_trailing<'a>(input: &'a str, separator: &str) -> Vec<&'a str> {
    if input.is_empty() {
        return vec![""];
    }
    let mut parts: Vec<&str> = input.split(separator).collect();
    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}

// ============================================================================
// Formatting Entry Points
// ============================================================================

/// Validate and canonicalize a raw identifier
///
/// `rules` of `None` skips the replacement stage (including the space
/// collapse that follows it); `Some(&[])` still collapses spaces.
pub fn normalize(
    raw: &str,
    kind: IdentifierKind,
    rules: Option<&[StringReplacementRule]>,
) -> FormatResult {
    let rules = rules.map(RuleSet::new);
    format_identifier(raw, kind, rules.as_ref())
}

/// Format a title: symbols become spaces, spaces collapse, letters lower-case
pub fn format_title(raw: &str, rules: Option<&[StringReplacementRule]>) -> FormatResult {
    let rules = rules.map(RuleSet::new);
    title_with(raw, rules.as_ref())
}

/// Format a year: the part before the first `-`, digits only, exactly four of them
pub fn format_year(raw: &str, rules: Option<&[StringReplacementRule]>) -> FormatResult {
    let rules = rules.map(RuleSet::new);
    year_with(raw, rules.as_ref())
}

fn prepare(raw: &str, control_replacement: &str, rules: Option<&RuleSet>) -> String {
    let cleaned = replace_control_chars(raw, control_replacement);
    match rules {
        Some(rules) => rules.apply(&cleaned),
        None => cleaned,
    }
}

fn format_identifier(raw: &str, kind: IdentifierKind, rules: Option<&RuleSet>) -> FormatResult {
    if kind == IdentifierKind::JournalTitle {
        return title_with(raw, rules);
    }
    if raw.is_empty() {
        return FormatResult::invalid();
    }

    let prepared = prepare(raw, "", rules);
    match kind {
        IdentifierKind::ArxivId => arxiv::format(&prepared),
        IdentifierKind::Doi => doi::format(&prepared),
        IdentifierKind::Isbn => {
            let isbn = retain(&prepared, |c| c.is_ascii_digit() || c == 'x' || c == 'X');
            if !checksum::is_isbn_valid(&isbn) {
                return FormatResult::invalid();
            }
            if isbn.len() == 10 {
                return checksum::isbn13_from_isbn10(&isbn)
                    .map(FormatResult::valid)
                    .unwrap_or_default();
            }
            FormatResult::valid(isbn)
        }
        IdentifierKind::Issn => {
            let issn = retain(&prepared, |c| c.is_ascii_digit() || c == 'x' || c == 'X');
            if checksum::is_issn_valid(&issn) {
                FormatResult::valid(issn)
            } else {
                FormatResult::invalid()
            }
        }
        IdentifierKind::Lccn => lccn::format(&prepared),
        IdentifierKind::Oclc | IdentifierKind::Pmid => {
            let digits = retain(&prepared, |c| c.is_ascii_digit());
            if digits.is_empty() {
                FormatResult::invalid()
            } else {
                FormatResult::valid(digits)
            }
        }
        IdentifierKind::JournalTitle => title_with(raw, rules),
    }
}

fn title_with(raw: &str, rules: Option<&RuleSet>) -> FormatResult {
    if raw.is_empty() {
        return FormatResult::invalid();
    }

    let mut title = prepare(raw, " ", rules);
    for symbol in TITLE_SYMBOLS {
        title = title.replace(symbol, " ");
    }
    let title = collapse_spaces(&title);

    if title.is_empty() {
        FormatResult::invalid()
    } else {
        FormatResult::valid(title.to_lowercase())
    }
}

fn year_with(raw: &str, rules: Option<&RuleSet>) -> FormatResult {
    let prepared = prepare(raw, "", rules);
    let Some(first) = split_dropping_trailing(&prepared, "-").into_iter().next() else {
        return FormatResult::invalid();
    };

    let year = retain(first, |c| c.is_ascii_digit());
    if year.len() == 4 {
        FormatResult::valid(year)
    } else {
        FormatResult::invalid()
    }
}

fn retain(input: &str, keep: impl Fn(char) -> bool) -> String {
    input.chars().filter(|c| keep(*c)).collect()
}

// ============================================================================
// Normalizer
// ============================================================================

/// Formatter bound to one source's replacement rules, with patterns compiled once
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    rules: Option<CompiledRules>,
}

#[derive(Debug, Clone)]
struct CompiledRules {
    arxiv_id: RuleSet,
    doi: RuleSet,
    isbn: RuleSet,
    issn: RuleSet,
    lccn: RuleSet,
    oclc: RuleSet,
    pmid: RuleSet,
    title: RuleSet,
    year: RuleSet,
}

impl Normalizer {
    /// Create a normalizer; `None` disables the replacement stage
    pub fn new(rules: Option<&ReplacementRules>) -> Self {
        Self {
            rules: rules.map(|r| CompiledRules {
                arxiv_id: RuleSet::new(&r.arxiv_id),
                doi: RuleSet::new(&r.doi),
                isbn: RuleSet::new(&r.isbn),
                issn: RuleSet::new(&r.issn),
                lccn: RuleSet::new(&r.lccn),
                oclc: RuleSet::new(&r.oclc),
                pmid: RuleSet::new(&r.pmid),
                title: RuleSet::new(&r.title),
                year: RuleSet::new(&r.year),
            }),
        }
    }

    fn rules_for(&self, kind: IdentifierKind) -> Option<&RuleSet> {
        let rules = self.rules.as_ref()?;
        Some(match kind {
            IdentifierKind::ArxivId => &rules.arxiv_id,
            IdentifierKind::Doi => &rules.doi,
            IdentifierKind::Isbn => &rules.isbn,
            IdentifierKind::Issn => &rules.issn,
            IdentifierKind::JournalTitle => &rules.title,
            IdentifierKind::Lccn => &rules.lccn,
            IdentifierKind::Oclc => &rules.oclc,
            IdentifierKind::Pmid => &rules.pmid,
        })
    }

    pub fn identifier(&self, raw: &str, kind: IdentifierKind) -> FormatResult {
        format_identifier(raw, kind, self.rules_for(kind))
    }

    pub fn title(&self, raw: &str) -> FormatResult {
        title_with(raw, self.rules.as_ref().map(|r| &r.title))
    }

    pub fn year(&self, raw: &str) -> FormatResult {
        year_with(raw, self.rules.as_ref().map(|r| &r.year))
    }
}

// ============================================================================
// Tests
// ============================================================================
