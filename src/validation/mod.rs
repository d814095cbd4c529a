use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use std::fmt;

pub const DESCRIPTION_MAX_LEN: usize = 50;
pub const AMOUNT_SCALE: i64 = 2;
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T = ()> = Result<T, ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sanitizes the description and checks it is non-empty and within
/// [`DESCRIPTION_MAX_LEN`] characters.
pub fn validate_description(raw: &str) -> ValidationResult<String> {
    let description = sanitize_string(raw);
    if description.is_empty() {
        return Err(ValidationError::new(
            "description",
            "description cannot be empty",
        ));
    }
    if description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(ValidationError::new(
            "description",
            format!("description exceeds {} characters", DESCRIPTION_MAX_LEN),
        ));
    }
    Ok(description)
}

/// Normalizes the amount to cents and rejects anything that is not positive
/// afterwards.
pub fn validate_amount(amount: &BigDecimal) -> ValidationResult<BigDecimal> {
    let normalized = amount.round(AMOUNT_SCALE).with_scale(AMOUNT_SCALE);
    if normalized <= BigDecimal::zero() {
        return Err(ValidationError::new(
            "amount_usd",
            "amount must be greater than zero",
        ));
    }
    Ok(normalized)
}

pub fn validate_transaction_date(date: NaiveDate, today: NaiveDate) -> ValidationResult {
    if date > today {
        return Err(ValidationError::new(
            "transaction_date",
            "transaction date cannot be in the future",
        ));
    }
    Ok(())
}

pub fn parse_date(field: &'static str, value: &str) -> ValidationResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::new(field, "expected a date formatted as YYYY-MM-DD"))
}
