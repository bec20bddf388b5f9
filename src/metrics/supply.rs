use log::warn;

use crate::error::{CollectorError, CollectorResult};

pub fn nept_supply_url(api_base_url: &str) -> String {
    format!("{}/nept/circulating_supply", api_base_url.trim_end_matches('/'))
}

pub fn ntoken_supply_url(api_base_url: &str, ntoken: &str) -> String {
    format!("{}/supply/{}", api_base_url.trim_end_matches('/'), ntoken)
}

/// Parse a plain-text numeric body. A JSON string body (`"123.4"`) is accepted.
pub fn parse_numeric(text: &str) -> CollectorResult<f64> {
    let trimmed = text.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim();

    unquoted
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CollectorError::Conversion { input: text.to_string() })
}

/// Like [`parse_numeric`] but records 0 (with a warning) when the body is not a number.
pub fn numeric_or_zero(label: &str, text: &str) -> f64 {
    match parse_numeric(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("{}: {}, recording 0", label, e);
            0.0
        },
    }
}
