//! Shared parameter-validation primitives.
//!
//! Every stage's `check()` is built from these. Each primitive fails fast
//! with a field-qualified [`ConfigurationError`] and never mutates state.

use crate::errors::ConfigurationError;

/// Rejects an empty (or whitespace-only) string.
pub fn check_empty(value: &str, field: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::new(format!(
            "{field} can not be empty"
        )));
    }
    Ok(())
}

/// Rejects a non-positive number.
pub fn check_positive_number(value: i64, field: &str) -> Result<(), ConfigurationError> {
    if value <= 0 {
        return Err(ConfigurationError::new(format!(
            "{field} should be a positive number"
        )));
    }
    Ok(())
}

/// Rejects a negative number.
pub fn check_nonnegative_number(value: i64, field: &str) -> Result<(), ConfigurationError> {
    if value < 0 {
        return Err(ConfigurationError::new(format!(
            "{field} should not be negative"
        )));
    }
    Ok(())
}

/// Rejects a value outside an enumerated choice set.
pub fn check_valid_value(
    value: &str,
    field: &str,
    allowed: &[&str],
) -> Result<(), ConfigurationError> {
    if !allowed.contains(&value) {
        return Err(ConfigurationError::new(format!(
            "{field} should be one of [{}]",
            allowed.join(", ")
        )));
    }
    Ok(())
}

/// Rejects a float outside the decimal range `0.0..=1.0`.
pub fn check_decimal_float(value: f32, field: &str) -> Result<(), ConfigurationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigurationError::new(format!(
            "{field} should be a float between 0 and 1"
        )));
    }
    Ok(())
}
