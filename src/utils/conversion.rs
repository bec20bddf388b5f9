//! Numeric conversions for contract payloads.
//!
//! Contract state encodes amounts and rates as decimal strings (sometimes bare JSON
//! numbers). Everything goes through BigDecimal so that large fixed-point integers
//! are scaled without losing precision before the final f64 conversion.

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::str::FromStr;

// ============================================
// JSON scalars
// ============================================

/// Parse a JSON string or number into a BigDecimal.
pub fn json_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// Parse a JSON string or number into a finite f64.
pub fn json_f64(value: &Value) -> Option<f64> {
    json_decimal(value)?.to_f64().filter(|v| v.is_finite())
}

// ============================================
// Fixed-point scaling
// ============================================

/// Scale a raw integer amount (JSON string or number) down by `10^decimals`.
///
/// Returns `None` for unparseable, negative or non-finite values.
///
/// # Example
/// ```ignore
/// let v = json_to_f64_with_decimals(&json!("1500000"), 6); // Some(1.5)
/// ```
pub fn json_to_f64_with_decimals(value: &Value, decimals: u8) -> Option<f64> {
    let big_value = json_decimal(value)?;

    let adjusted = if decimals == 0 { big_value } else { big_value / big_pow10(decimals) };

    let result = adjusted.to_f64()?;

    if result.is_finite() && result >= 0.0 {
        Some(result)
    } else {
        None
    }
}

// ============================================
// Rounding
// ============================================

/// Convert a 0–1 fraction into a percentage rounded to 2 decimal places.
///
/// The multiplication happens in decimal space, so `"0.0512"` becomes exactly `5.12`.
pub fn fraction_to_percent(value: &Value) -> Option<f64> {
    let fraction = json_decimal(value)?;
    let percent = (fraction * BigDecimal::from(100)).with_scale_round(2, RoundingMode::HalfEven);
    percent.to_f64().filter(|v| v.is_finite())
}

/// Round an f64 to `places` decimal places (half-even, like the reporting layer expects).
pub fn round_f64(value: f64, places: i64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    BigDecimal::try_from(value)
        .ok()
        .and_then(|d| d.with_scale_round(places, RoundingMode::HalfEven).to_f64())
        .unwrap_or(0.0)
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
pub(crate) fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}
