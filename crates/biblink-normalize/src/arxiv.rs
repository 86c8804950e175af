//! arXiv identifiers
//!
//! Two grammars exist: `archive[.subject]/YYMMNNN[vV]` for identifiers
//! assigned before April 2007 and `YYMM.NNNN[N][vV]` afterwards.

use biblink_core::FormatResult;
use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::split_dropping_trailing;

/// Archives allowed in front of old-style identifiers
static ARCHIVES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "stat", "q-bio", "cs", "nlin", "math", "astro-ph", "cond-mat", "gr-qc", "hep-ex",
        "hep-lat", "hep-ph", "hep-th", "math-ph", "nucl-ex", "nucl-th", "physics", "quant-ph",
        "alg-geom", "q-alg", "chao-dyn", "adap-org", "patt-sol", "funct-an", "dg-da", "comp-gas",
        "solv-int",
    ]
    .into_iter()
    .collect()
});

/// Archive spellings that lost their hyphen in some sources
const ARCHIVE_FIXUPS: [(&str, &str); 3] = [
    ("quantph", "quant-ph"),
    ("astroph", "astro-ph"),
    ("hepth", "hep-th"),
];

pub(crate) fn format(input: &str) -> FormatResult {
    let mut id = input.replace("arXiv:", "");
    for (from, to) in ARCHIVE_FIXUPS {
        id = id.replace(from, to);
    }

    let parts = split_dropping_trailing(&id, "/");
    let value = match parts.as_slice() {
        [archive, number] => old_style(archive, number),
        [number] => new_style(number).then(|| id.clone()),
        _ => None,
    };

    match value {
        Some(value) => FormatResult::valid(value),
        None => FormatResult::invalid(),
    }
}

/// `archive[.subject]/YYMMNNN[vV]`; the subject class is dropped from the result
fn old_style(archive: &str, number: &str) -> Option<String> {
    let versioned = split_dropping_trailing(number, "v");
    if versioned.len() > 2 {
        return None;
    }
    let serial = versioned.first()?;
    if serial.chars().count() != 7 || !all_digits(serial) {
        return None;
    }

    let archive = split_dropping_trailing(archive, ".").into_iter().next()?;
    if !ARCHIVES.contains(archive) {
        return None;
    }

    let (year, month) = year_month(serial)?;
    if month == 0 || month > 12 || (year == 7 && month > 3) || (year > 7 && year < 91) {
        return None;
    }

    if let Some(version) = versioned.get(1) {
        if !all_digits(version) {
            return None;
        }
    }

    Some(format!("{archive}/{number}"))
}

/// `YYMM.NNNN[N][vV]`
fn new_style(id: &str) -> bool {
    let parts = split_dropping_trailing(id, ".");
    let [year_month_part, rest] = parts.as_slice() else {
        return false;
    };
    if year_month_part.chars().count() != 4 || !all_digits(year_month_part) {
        return false;
    }

    let versioned = split_dropping_trailing(rest, "v");
    if versioned.len() > 2 {
        return false;
    }

    let Some((year, month)) = year_month(year_month_part) else {
        return false;
    };
    if year < 7 || month == 0 || month > 12 || (year == 7 && month <= 3) {
        return false;
    }

    // Four-digit sequence numbers through 1412, five digits afterwards
    let Some(serial) = versioned.first() else {
        return false;
    };
    let serial_len = if year <= 14 { 4 } else { 5 };
    if serial.chars().count() != serial_len || !all_digits(serial) {
        return false;
    }

    match versioned.get(1) {
        Some(version) => all_digits(version),
        None => true,
    }
}

fn year_month(digits: &str) -> Option<(u32, u32)> {
    let year = digits.get(0..2)?.parse().ok()?;
    let month = digits.get(2..4)?.parse().ok()?;
    Some((year, month))
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
