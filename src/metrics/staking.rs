use log::{debug, warn};
use serde_json::{json, Value};

use super::{as_list, as_pair};
use crate::db::models::{MetricPayload, MetricValue};
use crate::error::{CollectorError, CollectorResult};
use crate::reference::StakingPoolTable;
use crate::utils::{json_f64, json_to_f64_with_decimals, round_f64, STAKING_DECIMALS};

pub fn params_query() -> Value {
    json!({ "get_params": {} })
}

pub fn state_query() -> Value {
    json!({ "get_state": {} })
}

/// Stake and reward weight of one bond-duration pool, in whole NEPT.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStake {
    pub period_id: String,
    pub stake: f64,
    pub reward_weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolYield {
    pub period_id: String,
    pub stake: f64,
    /// Share of the emission rate allocated to this pool
    pub emission: f64,
    /// Annualised yield in percent, 2 decimals
    pub apr: f64,
}

/// Staking contract parameters relevant to yield.
#[derive(Debug, Clone, PartialEq)]
pub struct StakingParams {
    /// Emission rate in whole NEPT
    pub emission_rate: f64,
    /// (bond duration key, reward weight)
    pub reward_weights: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StakingMetrics {
    pub emission_rate: f64,
    pub total_bonded: f64,
    /// Emission over total bonded, in percent
    pub average_apr: f64,
    /// `pool_N` → bonded NEPT
    pub amounts: MetricPayload,
    /// `pool_N` → APR
    pub rates: MetricPayload,
}

/// Split the emission rate across pools in proportion to `stake * reward_weight`.
///
/// A pool with zero stake gets 0% APR. When no pool has effective weight every
/// pool gets 0% and no emission.
pub fn allocate_yield(emission_rate: f64, pools: &[PoolStake]) -> Vec<PoolYield> {
    let effective: Vec<f64> = pools
        .iter()
        .map(|p| {
            let w = p.stake * p.reward_weight;
            if w.is_finite() && w > 0.0 {
                w
            } else {
                0.0
            }
        })
        .collect();
    let total: f64 = effective.iter().sum();

    pools
        .iter()
        .zip(effective)
        .map(|(pool, weight)| {
            let emission = if total > 0.0 { emission_rate * weight / total } else { 0.0 };
            let apr = if pool.stake > 0.0 && emission > 0.0 {
                round_f64(emission / pool.stake * 100.0, 2)
            } else {
                0.0
            };
            PoolYield { period_id: pool.period_id.clone(), stake: pool.stake, emission, apr }
        })
        .collect()
}

/// Bond durations are compared as text so that `"2592000000000000"` and
/// `2592000000000000` match.
pub fn duration_key(duration: &Value) -> String {
    match duration {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// `{"emission_rate": "..", "bond_duration_settings": [[duration, {"reward_weight": ".."}], ...]}`
pub fn parse_params(raw: &Value) -> CollectorResult<StakingParams> {
    let emission_rate = json_to_f64_with_decimals(&raw["emission_rate"], STAKING_DECIMALS)
        .ok_or_else(|| CollectorError::decode(format!("invalid emission_rate in {}", raw)))?;

    let mut reward_weights = Vec::new();
    for entry in as_list(&raw["bond_duration_settings"], "bond_duration_settings")? {
        let (duration, settings) = as_pair(entry, "bond duration")?;
        let weight = json_f64(&settings["reward_weight"]).ok_or_else(|| {
            CollectorError::decode(format!("invalid reward_weight in {}", settings))
        })?;
        reward_weights.push((duration_key(duration), weight));
    }

    Ok(StakingParams { emission_rate, reward_weights })
}

/// `{"bonded": [[duration, amount], ...]}` → (duration key, whole NEPT)
pub fn parse_bonded(raw: &Value) -> CollectorResult<Vec<(String, f64)>> {
    as_list(&raw["bonded"], "bonded")?
        .iter()
        .map(|entry| {
            let (duration, amount) = as_pair(entry, "bonded")?;
            let stake = json_to_f64_with_decimals(amount, STAKING_DECIMALS)
                .ok_or_else(|| CollectorError::decode(format!("invalid bonded amount {}", amount)))?;
            Ok((duration_key(duration), stake))
        })
        .collect()
}

/// Pair bonded amounts with reward weights by bond duration.
pub fn correlate(params: &StakingParams, bonded: &[(String, f64)]) -> Vec<PoolStake> {
    bonded
        .iter()
        .map(|(period_id, stake)| {
            let reward_weight = params
                .reward_weights
                .iter()
                .find(|(key, _)| key == period_id)
                .map(|(_, w)| *w)
                .unwrap_or_else(|| {
                    warn!("No reward weight for bond duration {}, using 0", period_id);
                    0.0
                });
            PoolStake { period_id: period_id.clone(), stake: *stake, reward_weight }
        })
        .collect()
}

/// Derive emission, per-pool stakes and per-pool APRs from the staking contract's
/// params and state.
///
/// Pools whose bond duration is not in the reference data still take part in the
/// allocation and the bonded total but are not reported individually.
pub fn derive_staking(
    params_raw: &Value,
    state_raw: &Value,
    pools: &StakingPoolTable,
) -> CollectorResult<StakingMetrics> {
    let params = parse_params(params_raw)?;
    let bonded = parse_bonded(state_raw)?;
    let stakes = correlate(&params, &bonded);

    let total_bonded: f64 = stakes.iter().map(|p| p.stake).sum();
    let average_apr = if total_bonded > 0.0 {
        round_f64(params.emission_rate / total_bonded * 100.0, 2)
    } else {
        0.0
    };

    let mut amounts = MetricPayload::new();
    let mut rates = MetricPayload::new();
    for allocation in allocate_yield(params.emission_rate, &stakes) {
        let descriptor = match pools.pool_by_period(&allocation.period_id) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!("Skipping staking pool: {}", e);
                continue;
            },
        };
        amounts.insert(descriptor.key(), MetricValue::tokens(allocation.stake));
        rates.insert(descriptor.key(), MetricValue::percent(allocation.apr));
    }

    Ok(StakingMetrics {
        emission_rate: params.emission_rate,
        total_bonded,
        average_apr,
        amounts,
        rates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::staking_pool_table;

    fn stake(period: &str, stake: f64, weight: f64) -> PoolStake {
        PoolStake { period_id: period.to_string(), stake, reward_weight: weight }
    }

    #[test]
    fn test_weighted_allocation() {
        let pools = [stake("a", 1.0, 1.0), stake("b", 2.0, 1.0), stake("c", 3.0, 2.0)];
        let yields = allocate_yield(0.6, &pools);

        // effective weights 1, 2, 6 out of 9
        assert!((yields[2].emission - 0.4).abs() < 1e-12);
        assert_eq!(yields[0].apr, 6.67);
        assert_eq!(yields[1].apr, 6.67);
        assert_eq!(yields[2].apr, 13.33);
    }

    #[test]
    fn test_equal_weights_give_equal_apr() {
        let pools = [stake("a", 10.0, 1.0), stake("b", 50.0, 1.0), stake("c", 90.0, 1.0)];
        let yields = allocate_yield(15.0, &pools);

        assert!(yields.iter().all(|y| y.apr == 10.0));
    }

    #[test]
    fn test_zero_stake_pool() {
        let pools = [stake("a", 0.0, 1.0), stake("b", 100.0, 1.0), stake("c", 100.0, 1.0)];
        let yields = allocate_yield(20.0, &pools);

        assert_eq!(yields[0].apr, 0.0);
        assert_eq!(yields[0].emission, 0.0);
        let distributed: f64 = yields.iter().map(|y| y.emission).sum();
        assert!((distributed - 20.0).abs() < 1e-12);
        assert_eq!(yields[1].apr, 10.0);
        assert_eq!(yields[2].apr, 10.0);
    }

    #[test]
    fn test_no_effective_weight() {
        let pools = [stake("a", 0.0, 1.0), stake("b", 100.0, 0.0)];
        let yields = allocate_yield(20.0, &pools);
        assert!(yields.iter().all(|y| y.apr == 0.0 && y.emission == 0.0));
    }

    fn params() -> Value {
        json!({
            "emission_rate": "600000",
            "bond_duration_settings": [
                ["2592000000000000", {"reward_weight": "1"}],
                ["7776000000000000", {"reward_weight": "1"}],
                ["15552000000000000", {"reward_weight": "2"}]
            ]
        })
    }

    #[test]
    fn test_derive_staking_by_duration() {
        // State lists pools in a different order than params.
        let state = json!({
            "bonded": [
                ["15552000000000000", "3000000"],
                ["2592000000000000", "1000000"],
                ["7776000000000000", "2000000"]
            ]
        });
        let metrics = derive_staking(&params(), &state, &staking_pool_table()).unwrap();

        assert_eq!(metrics.emission_rate, 0.6);
        assert_eq!(metrics.total_bonded, 6.0);
        assert_eq!(metrics.average_apr, 10.0);
        assert_eq!(metrics.amounts["pool_1"], MetricValue::tokens(1.0));
        assert_eq!(metrics.amounts["pool_3"], MetricValue::tokens(3.0));
        assert_eq!(metrics.rates["pool_1"], MetricValue::percent(6.67));
        assert_eq!(metrics.rates["pool_2"], MetricValue::percent(6.67));
        assert_eq!(metrics.rates["pool_3"], MetricValue::percent(13.33));
    }

    #[test]
    fn test_unknown_duration_is_allocated_but_not_reported() {
        let params = json!({
            "emission_rate": "600000",
            "bond_duration_settings": [
                ["2592000000000000", {"reward_weight": "1"}],
                [31104000000000000u64, {"reward_weight": "1"}]
            ]
        });
        let state = json!({
            "bonded": [
                [2592000000000000u64, "1000000"],
                ["31104000000000000", "1000000"]
            ]
        });
        let metrics = derive_staking(&params, &state, &staking_pool_table()).unwrap();

        assert_eq!(metrics.amounts.len(), 1);
        assert_eq!(metrics.total_bonded, 2.0);
        // half of the emission went to the unreported pool
        assert_eq!(metrics.rates["pool_1"], MetricValue::percent(30.0));
    }

    #[test]
    fn test_missing_weight_defaults_to_zero() {
        let state = json!({"bonded": [["1", "1000000"], ["2592000000000000", "1000000"]]});
        let metrics = derive_staking(&params(), &state, &staking_pool_table()).unwrap();
        assert_eq!(metrics.rates["pool_1"], MetricValue::percent(60.0));
    }

    #[test]
    fn test_malformed_params() {
        let state = json!({"bonded": []});
        assert!(matches!(
            derive_staking(&json!({"emission_rate": "x"}), &state, &staking_pool_table()),
            Err(CollectorError::Decode(_))
        ));
    }
}
