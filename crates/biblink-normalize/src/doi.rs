//! Digital Object Identifiers
//!
//! ASCII letters are case-insensitive in DOIs, so they are upper-cased
//! before comparison. The value is then form-decoded: `+` becomes a space
//! and `%XX` escapes are decoded as UTF-8.

use biblink_core::FormatResult;

pub(crate) fn format(input: &str) -> FormatResult {
    let upper: String = input
        .chars()
        .map(|c| if c.is_ascii_lowercase() { c.to_ascii_uppercase() } else { c })
        .collect();

    let Some(decoded) = percent_decode(&upper) else {
        return FormatResult::invalid();
    };

    // The separator is the first slash anywhere, even one ahead of the directory.
    let directory = decoded.find("10.");
    let separator = decoded.find('/');
    match (directory, separator) {
        (Some(dir), Some(sep)) if sep > dir => FormatResult::valid(&decoded[dir..]),
        _ => FormatResult::invalid(),
    }
}

/// Decode `+` and `%XX` escapes; a malformed escape or invalid UTF-8 rejects the input
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3)?;
            if !escape.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(&input.replace('+', " "))
        .ok()
        .map(|s| s.into_owned())
}
