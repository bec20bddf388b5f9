use log::debug;
use serde_json::{json, Value};

use super::{as_list, as_pair};
use crate::db::models::{MetricPayload, MetricValue};
use crate::error::{CollectorError, CollectorResult};
use crate::reference::TokenTable;
use crate::utils::{asset_denom, fraction_to_percent};

pub fn borrow_rates_query() -> Value {
    json!({ "get_all_borrow_rates": {} })
}

pub fn lending_rates_query() -> Value {
    json!({ "get_all_lending_rates": {} })
}

/// Convert `[[asset_info, fraction], ...]` into ticker → percent (2 decimals).
///
/// Assets missing from the reference data are left out of the result.
pub fn derive_rates(raw: &Value, tokens: &TokenTable) -> CollectorResult<MetricPayload> {
    let mut payload = MetricPayload::new();

    for entry in as_list(raw, "rates")? {
        let (asset, rate) = as_pair(entry, "rate")?;
        let denom = asset_denom(asset)
            .ok_or_else(|| CollectorError::decode(format!("unrecognised asset info {}", asset)))?;

        let token = match tokens.token_by_denom(denom) {
            Ok(token) => token,
            Err(e) => {
                debug!("Skipping rate: {}", e);
                continue;
            },
        };

        let percent = fraction_to_percent(rate)
            .ok_or_else(|| CollectorError::decode(format!("invalid rate {} for {}", rate, denom)))?;

        payload.insert(token.ticker.clone(), MetricValue::percent(percent));
    }

    Ok(payload)
}
