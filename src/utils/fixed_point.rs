//! Fixed-point coercion for integer-typed history columns.
//!
//! Values are rounded half away from zero; NaN, infinities and anything
//! outside the i64 range are rejected instead of saturating.

use crate::models::errors::{AppError, AppResult};

/// Largest f64 strictly below 2^63
const I64_UPPER: f64 = 9_223_372_036_854_774_784.0;
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;

/// Round `value` to the nearest integer for column `field`.
pub fn round_to_i64(field: &str, value: f64) -> AppResult<i64> {
    if !value.is_finite() {
        return Err(AppError::numeric_range(field, value));
    }
    let rounded = value.round();
    if !(I64_LOWER..=I64_UPPER).contains(&rounded) {
        return Err(AppError::numeric_range(field, value));
    }
    Ok(rounded as i64)
}
