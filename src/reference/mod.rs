//! Static reference data: token descriptors and staking pool descriptors.
//!
//! Both tables are read from CSV files on first use and kept for the lifetime of
//! the [`ReferenceData`] object. Concurrent first readers share a single load.
//! An unreadable source yields an empty table, so every lookup misses and the
//! affected items are skipped by the derivations.

use std::io::Read;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::error::CollectorError;

/// How an asset is represented on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TokenType {
    #[serde(alias = "native_token", alias = "native")]
    Native,
    #[serde(alias = "token", alias = "contract", alias = "cw20")]
    Contract,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDescriptor {
    pub denom: String,
    pub ticker: String,
    pub decimals: u8,
    pub token_type: TokenType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingPoolDescriptor {
    /// Bond duration as the staking contract reports it
    pub period_id: String,
    pub pool_number: u32,
}

impl StakingPoolDescriptor {
    /// Payload key used for this pool in staking metrics, e.g. "pool_1".
    pub fn key(&self) -> String {
        format!("pool_{}", self.pool_number)
    }
}

#[derive(Debug, Deserialize)]
struct TokenRow {
    denom: String,
    ticker: String,
    decimals: u8,
    token_type: TokenType,
}

#[derive(Debug, Deserialize)]
struct StakingPoolRow {
    #[serde(alias = "period_nano")]
    period_id: String,
    #[serde(alias = "staking_pool")]
    pool_number: String,
}

/// Accepts "3" as well as "staking_pool_3".
fn parse_pool_number(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    raw.rsplit('_').next()?.parse().ok()
}

// ============================================
// Tables
// ============================================

/// Token descriptors in file order, indexed by denom.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: Vec<TokenDescriptor>,
    by_denom: FxHashMap<String, usize>,
}

impl TokenTable {
    pub fn new(descriptors: Vec<TokenDescriptor>) -> Self {
        let mut tokens = Vec::with_capacity(descriptors.len());
        let mut by_denom =
            FxHashMap::with_capacity_and_hasher(descriptors.len(), Default::default());

        for token in descriptors {
            if by_denom.contains_key(&token.denom) {
                warn!("Duplicate token denom {} in reference data, keeping first", token.denom);
                continue;
            }
            by_denom.insert(token.denom.clone(), tokens.len());
            tokens.push(token);
        }

        Self { tokens, by_denom }
    }

    pub fn from_csv<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        rdr.headers()?;
        let mut descriptors = Vec::new();

        for row in rdr.deserialize::<TokenRow>() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping malformed token row: {}", e);
                    continue;
                },
            };
            descriptors.push(TokenDescriptor {
                denom: row.denom,
                ticker: row.ticker,
                decimals: row.decimals,
                token_type: row.token_type,
            });
        }

        Ok(Self::new(descriptors))
    }

    pub fn token_by_denom(&self, denom: &str) -> Result<&TokenDescriptor, CollectorError> {
        self.by_denom
            .get(denom)
            .map(|&i| &self.tokens[i])
            .ok_or_else(|| CollectorError::LookupMiss { kind: "token", key: denom.to_string() })
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenDescriptor> {
        self.tokens.iter()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Staking pool descriptors in file order, indexed by bond duration.
#[derive(Debug, Clone, Default)]
pub struct StakingPoolTable {
    pools: Vec<StakingPoolDescriptor>,
    by_period: FxHashMap<String, usize>,
}

impl StakingPoolTable {
    pub fn new(descriptors: Vec<StakingPoolDescriptor>) -> Self {
        let mut pools = Vec::with_capacity(descriptors.len());
        let mut by_period =
            FxHashMap::with_capacity_and_hasher(descriptors.len(), Default::default());

        for pool in descriptors {
            if by_period.contains_key(&pool.period_id) {
                warn!("Duplicate staking period {} in reference data, keeping first", pool.period_id);
                continue;
            }
            by_period.insert(pool.period_id.clone(), pools.len());
            pools.push(pool);
        }

        Self { pools, by_period }
    }

    pub fn from_csv<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        rdr.headers()?;
        let mut descriptors = Vec::new();

        for row in rdr.deserialize::<StakingPoolRow>() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping malformed staking pool row: {}", e);
                    continue;
                },
            };
            match parse_pool_number(&row.pool_number) {
                Some(pool_number) => descriptors.push(StakingPoolDescriptor {
                    period_id: row.period_id,
                    pool_number,
                }),
                None => warn!(
                    "Skipping staking pool row with unparseable pool number {:?}",
                    row.pool_number
                ),
            }
        }

        Ok(Self::new(descriptors))
    }

    pub fn pool_by_period(&self, period_id: &str) -> Result<&StakingPoolDescriptor, CollectorError> {
        self.by_period
            .get(period_id)
            .map(|&i| &self.pools[i])
            .ok_or_else(|| CollectorError::LookupMiss {
                kind: "staking period",
                key: period_id.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &StakingPoolDescriptor> {
        self.pools.iter()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

// ============================================
// Cache
// ============================================

/// Lazily loaded, process-lifetime reference data.
///
/// Constructed once at startup and shared through `Arc`. There is no invalidation:
/// a changed file takes effect after a restart.
pub struct ReferenceData {
    tokens_path: PathBuf,
    staking_pools_path: PathBuf,
    tokens: OnceCell<TokenTable>,
    staking_pools: OnceCell<StakingPoolTable>,
}

impl ReferenceData {
    pub fn new(tokens_path: impl Into<PathBuf>, staking_pools_path: impl Into<PathBuf>) -> Self {
        Self {
            tokens_path: tokens_path.into(),
            staking_pools_path: staking_pools_path.into(),
            tokens: OnceCell::new(),
            staking_pools: OnceCell::new(),
        }
    }

    /// Reference data that is already populated (no file access).
    pub fn from_tables(tokens: TokenTable, staking_pools: StakingPoolTable) -> Self {
        Self {
            tokens_path: PathBuf::new(),
            staking_pools_path: PathBuf::new(),
            tokens: OnceCell::new_with(Some(tokens)),
            staking_pools: OnceCell::new_with(Some(staking_pools)),
        }
    }

    pub async fn load_tokens(&self) -> &TokenTable {
        self.tokens
            .get_or_init(|| async {
                let table = load_table(&self.tokens_path, "tokens", |b| TokenTable::from_csv(b)).await;
                info!("Loaded {} tokens from {}", table.len(), self.tokens_path.display());
                table
            })
            .await
    }

    pub async fn load_staking_pools(&self) -> &StakingPoolTable {
        self.staking_pools
            .get_or_init(|| async {
                let table = load_table(&self.staking_pools_path, "staking pools", |b| {
                    StakingPoolTable::from_csv(b)
                })
                .await;
                info!(
                    "Loaded {} staking pools from {}",
                    table.len(),
                    self.staking_pools_path.display()
                );
                table
            })
            .await
    }

    pub async fn token_by_denom(&self, denom: &str) -> Result<&TokenDescriptor, CollectorError> {
        self.load_tokens().await.token_by_denom(denom)
    }
}

async fn load_table<T, F>(path: &Path, what: &str, parse: F) -> T
where
    T: Default,
    F: FnOnce(&[u8]) -> Result<T, csv::Error>,
{
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read {} from {}: {}", what, path.display(), e);
            return T::default();
        },
    };

    match parse(&bytes) {
        Ok(table) => table,
        Err(e) => {
            error!("Failed to parse {} from {}: {}", what, path.display(), e);
            T::default()
        },
    }
}
