//! Library of Congress Control Numbers
//!
//! Normalization drops whitespace and anything after a `/`, checks the
//! alphabetic prefix and zero-pads the serial of `year-serial` forms.

use biblink_core::FormatResult;
use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::split_dropping_trailing;

static PREFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "ac", "af", "afl", "agr", "bi", "br", "bs", "c", "ca", "cad", "cd", "clc", "cs", "cx",
        "cy", "d", "do", "e", "es", "f", "fi", "fia", "fie", "g", "gm", "gs", "h", "ha", "he",
        "hew", "hex", "it", "int", "j", "ja", "jx", "k", "kx", "l", "llh", "ltf", "m", "ma", "map",
        "med", "mic", "mid", "mie", "mif", "mm", "mp", "mpa", "ms", "mus", "ncn", "ne", "nex",
        "no", "ntc", "nuc", "or", "pa", "pho", "php", "phq", "po", "pp", "r", "ra", "rc", "re",
        "ru", "s", "sa", "sax", "sc", "sd", "sf", "sg", "sn", "ss", "su", "tb", "tmp", "um", "unk",
        "w", "war", "x", "z", "n", "nb", "nr", "sh", "sj", "sp", "cf", "xca",
    ]
    .into_iter()
    .collect()
});

const SERIAL_WIDTH: usize = 6;

pub(crate) fn format(input: &str) -> FormatResult {
    let compact: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let Some(control) = split_dropping_trailing(&compact, "/").into_iter().next() else {
        return FormatResult::invalid();
    };
    if control.is_empty() {
        return FormatResult::invalid();
    }

    // The last character is never part of the prefix.
    let char_count = control.chars().count();
    let prefix_len = control
        .chars()
        .take(char_count - 1)
        .take_while(|c| !c.is_ascii_digit())
        .map(char::len_utf8)
        .sum::<usize>();
    let (raw_prefix, after_prefix) = control.split_at(prefix_len);

    let prefix = match raw_prefix {
        "" | "lc" => "",
        p if PREFIXES.contains(p) => p,
        _ => return FormatResult::invalid(),
    };

    let number = match split_dropping_trailing(after_prefix, "-").as_slice() {
        [year, serial] => {
            let year = digits_only(year);
            let serial = digits_only(serial);
            if year.is_empty() || serial.is_empty() {
                return FormatResult::invalid();
            }
            format!("{year}{serial:0>width$}", width = SERIAL_WIDTH)
        }
        parts if parts.len() > 2 => return FormatResult::invalid(),
        _ => after_prefix.to_string(),
    };

    FormatResult::valid(format!("{prefix}{number}"))
}

fn digits_only(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}
