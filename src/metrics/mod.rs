//! Metric derivation: pure functions from decoded contract state (plus reference
//! data) to unit-tagged metrics.
//!
//! - [`rates`] - Borrow and lending rates
//! - [`amounts`] - Lent, borrowed and collateral amounts
//! - [`accounts`] - Borrow account census
//! - [`staking`] - NEPT emission and staking yield allocation
//! - [`prices`] - Oracle prices
//! - [`supply`] - Circulating supplies from the protocol API
//! - [`executes`] - Contract execute counts
//! - [`lp_pools`] - LP pool listings

pub mod accounts;
pub mod amounts;
pub mod executes;
pub mod lp_pools;
pub mod prices;
pub mod rates;
pub mod staking;
pub mod supply;

use serde_json::Value;

use crate::error::{CollectorError, CollectorResult};

pub use accounts::AccountCensus;
pub use amounts::MarketAmounts;
pub use staking::{allocate_yield, PoolStake, PoolYield, StakingMetrics};

/// Interpret a response as a list, or fail with a decode error naming `what`.
pub(crate) fn as_list<'a>(raw: &'a Value, what: &str) -> CollectorResult<&'a Vec<Value>> {
    raw.as_array()
        .ok_or_else(|| CollectorError::decode(format!("{} response is not a list", what)))
}

/// Split a `[key, value]` tuple entry.
pub(crate) fn as_pair<'a>(entry: &'a Value, what: &str) -> CollectorResult<(&'a Value, &'a Value)> {
    match entry.as_array().map(Vec::as_slice) {
        Some([key, value, ..]) => Ok((key, value)),
        _ => Err(CollectorError::decode(format!("malformed {} entry: {}", what, entry))),
    }
}
