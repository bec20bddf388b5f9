use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Used for storing metric snapshots and LP pool snapshots.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    4
}

/// Chain endpoints used by the LCD transport.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    /// Cosmos LCD (REST) endpoint, e.g. "https://sentry.lcd.injective.network"
    pub lcd_url: String,
    /// Injective explorer API endpoint, used for contract execute counts
    pub explorer_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Addresses of the protocol contracts queried every cycle.
#[derive(Debug, Deserialize, Clone)]
pub struct ContractSettings {
    pub market: String,
    pub interest_model: String,
    pub oracle: String,
    pub staking: String,
}

impl ContractSettings {
    /// Protocol contracts whose execute counts are tracked, keyed by contract type.
    pub fn tracked(&self) -> [(&'static str, &str); 4] {
        [
            ("market", self.market.as_str()),
            ("interest_model", self.interest_model.as_str()),
            ("oracle", self.oracle.as_str()),
            ("staking", self.staking.as_str()),
        ]
    }
}

/// Off-chain HTTP sources.
#[derive(Debug, Deserialize, Clone)]
pub struct ExternalSettings {
    /// Base URL of the protocol API (circulating supplies)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// JSON list of LP pools. LP collection is skipped when unset.
    #[serde(default)]
    pub lp_pools_url: Option<String>,
    /// nTokens whose circulating supply is collected
    #[serde(default = "default_ntokens")]
    pub ntokens: Vec<String>,
}

fn default_api_base_url() -> String {
    "https://api.nept.finance/v1".to_string()
}

fn default_ntokens() -> Vec<String> {
    ["natom", "nusdt", "nusdc", "ninj", "nweth", "nausd", "nsol", "ntia"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Collection cadence and reference data locations.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorSettings {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,
    /// Per-category deadline; a category past it is left out of the cycle
    #[serde(default = "default_category_timeout_secs")]
    pub category_timeout_secs: u64,
    #[serde(default = "default_account_page_size")]
    pub account_page_size: usize,
    #[serde(default = "default_tokens_path")]
    pub tokens_path: String,
    #[serde(default = "default_staking_pools_path")]
    pub staking_pools_path: String,
}

fn default_interval_minutes() -> u64 {
    24 * 60
}

fn default_cycle_timeout_secs() -> u64 {
    600
}

fn default_category_timeout_secs() -> u64 {
    120
}

fn default_account_page_size() -> usize {
    100
}

fn default_tokens_path() -> String {
    "reference/tokens.csv".to_string()
}

fn default_staking_pools_path() -> String {
    "reference/staking_pools.csv".to_string()
}

impl CollectorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn category_timeout(&self) -> Duration {
        Duration::from_secs(self.category_timeout_secs)
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
            category_timeout_secs: default_category_timeout_secs(),
            account_page_size: default_account_page_size(),
            tokens_path: default_tokens_path(),
            staking_pools_path: default_staking_pools_path(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup, with `COLLECTOR__SECTION__KEY`
/// environment variables taking precedence.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub chain: ChainSettings,
    pub contracts: ContractSettings,
    pub external: ExternalSettings,
    #[serde(default)]
    pub collector: CollectorSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("COLLECTOR").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
