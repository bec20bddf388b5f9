use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric families persisted every cycle.
///
/// `MarketData` is the primary category: its latest timestamp drives catch-up
/// scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    MarketData,
    BorrowRates,
    LendingRates,
    LentAmounts,
    BorrowedAmounts,
    NTokenSupply,
    TokenPrices,
    NTokenExecutes,
    MarketExecutes,
    NeptData,
    StakingAmounts,
    StakingRates,
    CollateralAmounts,
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 13] = [
        MetricCategory::MarketData,
        MetricCategory::BorrowRates,
        MetricCategory::LendingRates,
        MetricCategory::LentAmounts,
        MetricCategory::BorrowedAmounts,
        MetricCategory::NTokenSupply,
        MetricCategory::TokenPrices,
        MetricCategory::NTokenExecutes,
        MetricCategory::MarketExecutes,
        MetricCategory::NeptData,
        MetricCategory::StakingAmounts,
        MetricCategory::StakingRates,
        MetricCategory::CollateralAmounts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::MarketData => "market_data",
            MetricCategory::BorrowRates => "borrow_rates",
            MetricCategory::LendingRates => "lending_rates",
            MetricCategory::LentAmounts => "lent_amounts",
            MetricCategory::BorrowedAmounts => "borrowed_amounts",
            MetricCategory::NTokenSupply => "ntoken_supply",
            MetricCategory::TokenPrices => "token_prices",
            MetricCategory::NTokenExecutes => "ntoken_executes",
            MetricCategory::MarketExecutes => "market_executes",
            MetricCategory::NeptData => "nept_data",
            MetricCategory::StakingAmounts => "staking_amounts",
            MetricCategory::StakingRates => "staking_rates",
            MetricCategory::CollateralAmounts => "collateral_amounts",
        }
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown metric category {:?}", s))
    }
}

/// Unit tag carried with every metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Percentage points (5.12 means 5.12%)
    Percent,
    Usd,
    /// Whole tokens, already scaled by the token's decimals
    Tokens,
    Count,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Percent => "percent",
            Unit::Usd => "usd",
            Unit::Tokens => "tokens",
            Unit::Count => "count",
        }
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percent" => Ok(Unit::Percent),
            "usd" => Ok(Unit::Usd),
            "tokens" => Ok(Unit::Tokens),
            "count" => Ok(Unit::Count),
            other => Err(format!("unknown unit {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub unit: Unit,
}

impl MetricValue {
    pub fn percent(value: f64) -> Self {
        Self { value, unit: Unit::Percent }
    }

    pub fn usd(value: f64) -> Self {
        Self { value, unit: Unit::Usd }
    }

    pub fn tokens(value: f64) -> Self {
        Self { value, unit: Unit::Tokens }
    }

    pub fn count(value: u64) -> Self {
        Self { value: value as f64, unit: Unit::Count }
    }
}

/// Reporting format: `5.12%`, `$1.23`, `1234.5`, `42`.
impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Unit::Percent => write!(f, "{}%", self.value),
            Unit::Usd => write!(f, "${}", self.value),
            Unit::Tokens => write!(f, "{}", self.value),
            Unit::Count => write!(f, "{}", self.value.round() as i64),
        }
    }
}

/// Symbol / pool key → value, ordered for stable output.
pub type MetricPayload = BTreeMap<String, MetricValue>;

/// One category's metrics for one collection cycle.
///
/// Query Patterns:
///   - "Latest borrow rates"
///   - "Staking APRs over the last 30 days"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub timestamp: DateTime<Utc>,
    pub category: MetricCategory,
    pub payload: MetricPayload,
}

impl MetricSnapshot {
    /// Payload rendered for the reporting edge.
    pub fn formatted(&self) -> BTreeMap<String, String> {
        self.payload.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
    }
}
