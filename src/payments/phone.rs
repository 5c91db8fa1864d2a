//! Phone number canonicalisation for M-Pesa.
//!
//! The gateway only accepts `254` followed by a nine digit subscriber number
//! that starts with the mobile prefix `7`. Every charge goes through
//! [`normalize_phone_number`] first.

use thiserror::Error;

pub const COUNTRY_CODE: &str = "254";
pub const MOBILE_PREFIX: char = '7';
const SUBSCRIBER_DIGITS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid phone number '{raw}': {reason}")]
pub struct InvalidPhoneNumber {
    pub raw: String,
    pub reason: &'static str,
}

pub fn normalize_phone_number(raw: &str) -> Result<String, InvalidPhoneNumber> {
    let invalid = |reason| InvalidPhoneNumber {
        raw: raw.to_string(),
        reason,
    };

    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if cleaned.is_empty() {
        return Err(invalid("phone number is empty"));
    }

    let canonical = if let Some(rest) = cleaned.strip_prefix('+') {
        if !rest.starts_with(COUNTRY_CODE) {
            return Err(invalid("unsupported country code"));
        }
        rest.to_string()
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        format!("{}{}", COUNTRY_CODE, rest)
    } else {
        cleaned
    };

    let subscriber = canonical
        .strip_prefix(COUNTRY_CODE)
        .ok_or_else(|| invalid("must start with 0, +254 or 254"))?;

    if subscriber.len() != SUBSCRIBER_DIGITS {
        return Err(invalid("subscriber number must have 9 digits"));
    }
    if !subscriber.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("phone number must contain only digits"));
    }
    if !subscriber.starts_with(MOBILE_PREFIX) {
        return Err(invalid("not a mobile number"));
    }

    Ok(canonical)
}

impl From<InvalidPhoneNumber> for crate::error::AppError {
    fn from(err: InvalidPhoneNumber) -> Self {
        use crate::error::{AppError, AppErrorKind, ValidationError};

        AppError::new(AppErrorKind::Validation(
            ValidationError::InvalidPhoneNumber {
                phone: err.raw,
                reason: err.reason.to_string(),
            },
        ))
    }
}
