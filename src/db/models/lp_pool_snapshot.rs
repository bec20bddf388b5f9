use chrono::{DateTime, Utc};
use serde::Serialize;

/// Liquidity pool metrics captured once per cycle.
///
/// Primary Key: (timestamp, pool_address)
/// Query Pattern: "Latest liquidity and yield for every tracked LP pool"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LpPoolSnapshot {
    pub timestamp: DateTime<Utc>,
    pub pool_address: String,
    pub symbol: String,

    // 24h activity in USD
    pub liquidity_usd: f64,
    pub volume_usd: f64,
    pub fees_usd: f64,

    // Yield components (percent)
    pub yield_pool_fees: f64,
    pub yield_astro_rewards: f64,
    pub yield_external_rewards: f64,
    pub yield_total: f64,
}
