use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::db::models::LpPoolSnapshot;
use crate::error::{CollectorError, CollectorResult};
use crate::utils::json_f64;

/// Numbers may arrive as strings, numbers or nulls; anything unparseable is 0.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(json_f64(&value).filter(|v| v.is_finite()).unwrap_or(0.0))
}

#[derive(Debug, Deserialize)]
struct LpPoolRecord {
    #[serde(alias = "poolAddress", alias = "address")]
    pool_address: String,
    #[serde(default, alias = "LP_symbol", alias = "lp_symbol", alias = "lpSymbol")]
    symbol: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[serde(alias = "total_liquidity_usd", alias = "totalLiquidityUsd", alias = "liquidityUsd")]
    liquidity_usd: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[serde(alias = "day_volume_usd", alias = "dayVolumeUsd", alias = "volumeUsd")]
    volume_usd: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[serde(alias = "day_LP_fees_usd", alias = "dayLpFeesUsd", alias = "feesUsd")]
    fees_usd: f64,
    #[serde(default, deserialize_with = "lenient_f64", alias = "yieldPoolFees")]
    yield_pool_fees: f64,
    #[serde(default, deserialize_with = "lenient_f64", alias = "yieldAstroRewards")]
    yield_astro_rewards: f64,
    #[serde(default, deserialize_with = "lenient_f64", alias = "yieldExternalRewards")]
    yield_external_rewards: f64,
    #[serde(default, deserialize_with = "lenient_f64", alias = "yieldTotal")]
    yield_total: f64,
}

impl LpPoolRecord {
    fn into_snapshot(self, timestamp: DateTime<Utc>) -> LpPoolSnapshot {
        LpPoolSnapshot {
            timestamp,
            pool_address: self.pool_address,
            symbol: self.symbol,
            liquidity_usd: self.liquidity_usd,
            volume_usd: self.volume_usd,
            fees_usd: self.fees_usd,
            yield_pool_fees: self.yield_pool_fees,
            yield_astro_rewards: self.yield_astro_rewards,
            yield_external_rewards: self.yield_external_rewards,
            yield_total: self.yield_total,
        }
    }
}

/// Parse an LP pool listing: either a bare list or an object with a `pools` list.
///
/// Entries without a pool address are skipped. Duplicate addresses are kept here
/// and collapsed when added to the cycle batch.
pub fn derive_lp_pools(raw: &Value, timestamp: DateTime<Utc>) -> CollectorResult<Vec<LpPoolSnapshot>> {
    let entries = match raw {
        Value::Array(entries) => entries,
        Value::Object(map) => map
            .get("pools")
            .and_then(Value::as_array)
            .ok_or_else(|| CollectorError::decode("LP pool listing has no pools list"))?,
        other => {
            return Err(CollectorError::decode(format!("unexpected LP pool listing {}", other)))
        },
    };

    let mut pools = Vec::with_capacity(entries.len());
    for entry in entries {
        match LpPoolRecord::deserialize(entry) {
            Ok(record) if !record.pool_address.is_empty() => {
                pools.push(record.into_snapshot(timestamp))
            },
            Ok(_) => warn!("Skipping LP pool with empty address"),
            Err(e) => warn!("Skipping malformed LP pool entry: {}", e),
        }
    }
    Ok(pools)
}
