//! User-defined string replacement rules
//!
//! Rules run in order over the control-character-free input. Afterwards
//! runs of spaces collapse to one and the result is trimmed.

use biblink_core::{ReplacementMode, StringReplacementRule};
use once_cell::sync::Lazy;
use regex::Regex;

static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(" +").expect("static pattern"));

/// A rule with its pattern compiled once
#[derive(Debug, Clone)]
struct CompiledRule {
    rule: StringReplacementRule,
    /// `None` for literal rules and for regex rules whose pattern did not compile
    pattern: Option<Regex>,
}

/// An ordered list of replacement rules, ready to apply
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn new(rules: &[StringReplacementRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| {
                let pattern = match rule.mode {
                    ReplacementMode::Regex => match Regex::new(&rule.search) {
                        Ok(re) => Some(re),
                        Err(e) => {
                            tracing::warn!(
                                pattern = %rule.search,
                                error = %e,
                                "Ignoring replacement rule with invalid pattern"
                            );
                            None
                        }
                    },
                    _ => None,
                };
                CompiledRule {
                    rule: rule.clone(),
                    pattern,
                }
            })
            .collect();

        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order, then collapse spaces and trim
    pub fn apply(&self, input: &str) -> String {
        // Split points are clamped against the input as given, not as rewritten.
        let input_len = input.chars().count() as i64;
        let mut replaced = input.to_string();

        for compiled in &self.rules {
            let rule = &compiled.rule;
            let index = rule.index.clamp(0, input_len) as usize;

            match rule.mode {
                ReplacementMode::Anywhere => {
                    replaced = replace_literal(&replaced, &rule.search, &rule.replacement);
                }
                ReplacementMode::BeforeEnd => {
                    if replaced.chars().count() > rule.search.chars().count()
                        && replaced.ends_with(rule.search.as_str())
                    {
                        replaced.truncate(replaced.len() - rule.search.len());
                        replaced.push_str(&rule.replacement);
                    }
                }
                ReplacementMode::AfterIndex => {
                    if index < replaced.chars().count() {
                        let (head, tail) = split_at_char(&replaced, index);
                        replaced = format!(
                            "{head}{}",
                            replace_literal(tail, &rule.search, &rule.replacement)
                        );
                    }
                }
                ReplacementMode::BeforeIndex => {
                    if index > 0 {
                        let (head, tail) = split_at_char(&replaced, index);
                        replaced = format!(
                            "{}{tail}",
                            replace_literal(head, &rule.search, &rule.replacement)
                        );
                    }
                }
                ReplacementMode::Regex => {
                    if let Some(pattern) = &compiled.pattern {
                        replaced = pattern
                            .replace_all(&replaced, rule.replacement.as_str())
                            .into_owned();
                    }
                }
            }
        }

        collapse_spaces(&replaced)
    }
}

/// Apply a rule list once, compiling its patterns on the spot
pub fn apply_rules(input: &str, rules: &[StringReplacementRule]) -> String {
    RuleSet::new(rules).apply(input)
}

/// Collapse runs of spaces to a single space and trim control characters and spaces
pub fn collapse_spaces(input: &str) -> String {
    let collapsed = SPACE_RUNS.replace_all(input, " ");
    collapsed.trim_matches(|c: char| c <= ' ').to_string()
}

fn replace_literal(input: &str, search: &str, replacement: &str) -> String {
    if search.is_empty() {
        // An empty needle matches between every character.
        let mut out = String::with_capacity(input.len() + replacement.len());
        out.push_str(replacement);
        for c in input.chars() {
            out.push(c);
            out.push_str(replacement);
        }
        return out;
    }
    input.replace(search, replacement)
}

fn split_at_char(input: &str, index: usize) -> (&str, &str) {
    let byte = input
        .char_indices()
        .nth(index)
        .map(|(b, _)| b)
        .unwrap_or(input.len());
    input.split_at(byte)
}
