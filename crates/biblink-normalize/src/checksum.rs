//! Check-digit arithmetic for ISBN and ISSN
//!
//! Inputs are expected to hold only `0-9`, `x` and `X`.

/// Digit value, with a trailing `X` standing for ten
fn check_value(c: char) -> Option<u32> {
    match c {
        'x' | 'X' => Some(10),
        c => c.to_digit(10),
    }
}

/// Modulus-11 check used by ISBN-10 (`weight_start` = 10) and ISSN (8)
fn mod11_valid(chars: &[char], weight_start: u32) -> bool {
    let Some((&last, body)) = chars.split_last() else {
        return false;
    };

    let mut sum = 0;
    for (i, c) in body.iter().enumerate() {
        let Some(digit) = c.to_digit(10) else {
            return false;
        };
        sum += (weight_start - i as u32) * digit;
    }

    match check_value(last) {
        Some(check) => (11 - sum % 11) % 11 == check,
        None => false,
    }
}

/// Modulus-10 sum with alternating weights 1 and 3
fn mod10_sum(digits: &[u32]) -> u32 {
    digits
        .iter()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { *d } else { d * 3 })
        .sum()
}

/// Whether a 10- or 13-character ISBN carries a correct check digit
pub fn is_isbn_valid(isbn: &str) -> bool {
    let chars: Vec<char> = isbn.chars().collect();
    match chars.len() {
        10 => mod11_valid(&chars, 10),
        13 => {
            let digits: Option<Vec<u32>> = chars.iter().map(|c| c.to_digit(10)).collect();
            let Some(digits) = digits else {
                return false;
            };
            (10 - mod10_sum(&digits[..12]) % 10) % 10 == digits[12]
        }
        _ => false,
    }
}

/// ISBN-13 equivalent of a valid ISBN-10
///
/// Returns `None` when the input is not ten characters of which the first nine are digits.
pub fn isbn13_from_isbn10(isbn10: &str) -> Option<String> {
    let chars: Vec<char> = isbn10.chars().collect();
    if chars.len() != 10 {
        return None;
    }

    let body = format!("978{}", chars[..9].iter().collect::<String>());
    let digits: Option<Vec<u32>> = body.chars().map(|c| c.to_digit(10)).collect();
    let check = (10 - mod10_sum(&digits?) % 10) % 10;

    Some(format!("{body}{check}"))
}

/// Whether an 8-character ISSN carries a correct check digit
pub fn is_issn_valid(issn: &str) -> bool {
    let chars: Vec<char> = issn.chars().collect();
    chars.len() == 8 && mod11_valid(&chars, 8)
}
