use log::debug;
use serde_json::{json, Value};

use super::{as_list, as_pair};
use crate::db::models::{MetricPayload, MetricValue};
use crate::error::{CollectorError, CollectorResult};
use crate::reference::{TokenDescriptor, TokenTable};
use crate::utils::{asset_denom, json_to_f64_with_decimals};

pub fn all_markets_query() -> Value {
    json!({ "get_all_markets": {} })
}

pub fn collateral_totals_query() -> Value {
    json!({ "get_all_collateral_totals": {} })
}

/// Lent and borrowed totals per ticker, both taken from one markets response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketAmounts {
    pub lent: MetricPayload,
    pub borrowed: MetricPayload,
}

fn scaled(raw: &Value, token: &TokenDescriptor, field: &str) -> CollectorResult<MetricValue> {
    json_to_f64_with_decimals(raw, token.decimals)
        .map(MetricValue::tokens)
        .ok_or_else(|| {
            CollectorError::decode(format!("invalid {} {} for {}", field, raw, token.denom))
        })
}

/// Resolve the token for an asset-info entry; `None` means skip the entry.
fn resolve<'t>(asset: &Value, tokens: &'t TokenTable) -> CollectorResult<Option<&'t TokenDescriptor>> {
    let denom = asset_denom(asset)
        .ok_or_else(|| CollectorError::decode(format!("unrecognised asset info {}", asset)))?;

    match tokens.token_by_denom(denom) {
        Ok(token) => Ok(Some(token)),
        Err(e) => {
            debug!("Skipping amount: {}", e);
            Ok(None)
        },
    }
}

/// Derive lending principal and debt balance per market, scaled by token decimals.
///
/// Markets: `[[asset_info, {"lending_principal": "..", "debt_pool": {"balance": ".."}}], ...]`
pub fn derive_market_amounts(raw: &Value, tokens: &TokenTable) -> CollectorResult<MarketAmounts> {
    let mut amounts = MarketAmounts::default();

    for entry in as_list(raw, "markets")? {
        let (asset, market) = as_pair(entry, "market")?;
        let Some(token) = resolve(asset, tokens)? else {
            continue;
        };

        let lent = scaled(&market["lending_principal"], token, "lending_principal")?;
        let borrowed = scaled(&market["debt_pool"]["balance"], token, "debt balance")?;

        amounts.lent.insert(token.ticker.clone(), lent);
        amounts.borrowed.insert(token.ticker.clone(), borrowed);
    }

    Ok(amounts)
}

/// Derive total collateral per asset from `[[asset_info, amount], ...]`.
pub fn derive_collateral_amounts(raw: &Value, tokens: &TokenTable) -> CollectorResult<MetricPayload> {
    let mut payload = MetricPayload::new();

    for entry in as_list(raw, "collateral totals")? {
        let (asset, amount) = as_pair(entry, "collateral")?;
        let Some(token) = resolve(asset, tokens)? else {
            continue;
        };
        payload.insert(token.ticker.clone(), scaled(amount, token, "collateral")?);
    }

    Ok(payload)
}
