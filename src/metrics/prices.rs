use serde_json::{json, Value};

use crate::error::{CollectorError, CollectorResult};
use crate::reference::TokenDescriptor;
use crate::utils::{asset_info_for, json_f64};

/// Oracle `get_price` query for one token.
pub fn price_query(token: &TokenDescriptor) -> Value {
    json!({ "get_price": { "asset": asset_info_for(token) } })
}

/// USD price from `{"price": "..", ...}`.
pub fn derive_price(raw: &Value) -> CollectorResult<f64> {
    json_f64(&raw["price"])
        .filter(|p| *p >= 0.0)
        .ok_or_else(|| CollectorError::decode(format!("invalid oracle price response {}", raw)))
}
