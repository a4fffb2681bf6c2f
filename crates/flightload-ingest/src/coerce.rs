//! Raw column coercion
//!
//! The flight extracts write every numeric column as a decimal (`"12.00"`),
//! leave optional columns empty, and encode flags as `0.00` / `1.00`.

use crate::error::CoercionError;
use crate::models::CancellationReason;

fn is_blank(raw: &str) -> bool {
    raw.trim().is_empty()
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<f64, CoercionError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| CoercionError::new(field, raw, "not a decimal number"))?;

    if !value.is_finite() {
        return Err(CoercionError::new(field, raw, "not a finite number"));
    }
    Ok(value)
}

/// Whole minutes or counts, truncated toward zero; blank means absent
pub fn optional_minutes(field: &'static str, raw: &str) -> Result<Option<i64>, CoercionError> {
    if is_blank(raw) {
        return Ok(None);
    }
    parse_decimal(field, raw).map(|v| Some(v.trunc() as i64))
}

/// Same as [`optional_minutes`] but the column must be filled
pub fn required_count(field: &'static str, raw: &str) -> Result<i64, CoercionError> {
    if is_blank(raw) {
        return Err(CoercionError::new(field, raw, "value is required"));
    }
    parse_decimal(field, raw).map(|v| v.trunc() as i64)
}

/// A 0/1 indicator stored as a decimal.
///
/// Rounded half-to-even, then `0` is false and `1` is true. Anything else,
/// blank and negative zero included, is an error.
pub fn indicator(field: &'static str, raw: &str) -> Result<bool, CoercionError> {
    let rounded = parse_decimal(field, raw)?.round_ties_even();

    if rounded == 0.0 && rounded.is_sign_positive() {
        Ok(false)
    } else if rounded == 1.0 {
        Ok(true)
    } else {
        Err(CoercionError::new(field, raw, "indicator must round to 0 or 1"))
    }
}

/// A-D map to a reason; blank or any other code has none
pub fn cancellation_reason(raw: &str) -> Option<CancellationReason> {
    CancellationReason::from_code(raw.trim())
}
