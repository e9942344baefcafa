//! Field validators shared by request types.

pub mod phone;

use std::borrow::Cow;
use validator::ValidationError;

pub use phone::normalize_phone;

use crate::models::offering::YearGroup;

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
    if normalize_phone(value).is_some() {
        Ok(())
    } else {
        Err(error("phone", "must be a valid phone number"))
    }
}

/// Like [`validate_phone`] but lets an empty value through.
pub fn validate_optional_phone(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Ok(());
    }
    validate_phone(value)
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(error("blank", "must not be blank"))
    } else {
        Ok(())
    }
}

/// CRM record ids: ASCII letters, digits, `-` and `_`.
pub fn validate_record_id(value: &str) -> Result<(), ValidationError> {
    let well_formed = !value.is_empty()
        && value.len() <= 64
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if well_formed {
        Ok(())
    } else {
        Err(error("record_id", "must be a record id"))
    }
}

pub fn validate_year_group(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<YearGroup>()
        .map(|_| ())
        .map_err(|_| error("year_group", "must be one of: gcse, alevel"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validators_accept_and_reject() {
        assert!(validate_phone("07700 900123").is_ok());
        assert!(validate_phone("call me").is_err());
        assert!(validate_optional_phone("").is_ok());
        assert!(validate_optional_phone("12").is_err());
        assert!(validate_not_blank("x").is_ok());
        assert!(validate_not_blank("   ").is_err());
        assert!(validate_record_id("off_1").is_ok());
        assert!(validate_record_id("0b3f9c2e-55aa-4d1e").is_ok());
        for bad in ["", "../bookings", "off_1?x=1", "off#1", "a/b", " off_1"] {
            assert!(validate_record_id(bad).is_err(), "{:?}", bad);
        }
        assert!(validate_year_group("gcse").is_ok());
        assert_eq!(
            validate_year_group("ks2").unwrap_err().code,
            Cow::Borrowed("year_group")
        );
    }
}
