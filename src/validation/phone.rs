//! Phone number normalization to E.164.
//!
//! UK-centric heuristics: national `0` trunk numbers and bare `7xxx` mobiles
//! gain `+44`; anything else with 10 to 15 digits is taken as already carrying
//! its country code.

const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

/// Returns the E.164 form of `raw`, or `None` when it cannot be interpreted.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let (has_plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return None,
        }
    }

    let in_range = |d: &str| (MIN_DIGITS..=MAX_DIGITS).contains(&d.len());

    if has_plus {
        return in_range(&digits).then(|| format!("+{}", digits));
    }

    if let Some(international) = digits.strip_prefix("00") {
        return in_range(international).then(|| format!("+{}", international));
    }

    if digits.len() == 11 && digits.starts_with('0') {
        return Some(format!("+44{}", &digits[1..]));
    }

    if digits.len() == 10 && digits.starts_with('7') {
        return Some(format!("+44{}", digits));
    }

    if digits.len() == 12 && digits.starts_with("44") {
        return Some(format!("+{}", digits));
    }

    in_range(&digits).then(|| format!("+{}", digits))
}
