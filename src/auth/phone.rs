use lazy_static::lazy_static;
use regex::Regex;

pub const COUNTRY_CODE: &str = "233";

/// Canonicalizes a phone number to `233` followed by the subscriber digits.
///
/// Never fails: garbage in yields a canonical-looking string that
/// [`is_valid_phone`] rejects.
pub fn normalize(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(rest) = digits.strip_prefix('0') {
        return format!("{COUNTRY_CODE}{rest}");
    }
    if digits.starts_with(COUNTRY_CODE) {
        return digits;
    }
    format!("{COUNTRY_CODE}{digits}")
}

/// Storage format of a canonical phone number.
pub fn is_valid_phone(canonical: &str) -> bool {
    lazy_static! {
        static ref PHONE_RE: Regex = Regex::new(r"^233\d{9}$").unwrap();
    }
    PHONE_RE.is_match(canonical)
}
