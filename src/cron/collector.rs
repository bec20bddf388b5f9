//! One collection cycle across every metric category.
//!
//! Categories are derived concurrently and independently: a category whose query or
//! decode fails, or that runs past `category_timeout_secs`, is logged and left out of
//! the cycle. Everything that succeeded is staged in one [`CycleBatch`] and committed
//! atomically.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::{join_all, try_join_all};
use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::chain::ContractQuerier;
use crate::config::{CollectorSettings, ContractSettings, ExternalSettings};
use crate::db::models::{CycleBatch, LpPoolSnapshot, MetricCategory, MetricPayload, MetricValue};
use crate::db::SnapshotStore;
use crate::error::{CollectorError, CollectorResult};
use crate::external::ExternalSource;
use crate::metrics::{
    accounts, amounts, executes, lp_pools, prices, rates, staking, supply, AccountCensus,
};
use crate::reference::{ReferenceData, TokenType};

type Staged = Vec<(MetricCategory, MetricPayload)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    Collecting,
    Committed,
    Failed,
}

/// Result of the most recent cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub timestamp: DateTime<Utc>,
    /// `Committed` or `Failed`
    pub state: CycleState,
    pub collected: Vec<MetricCategory>,
    /// Task names that failed and were left out
    pub failed: Vec<String>,
    pub records: usize,
    pub lp_pools: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Published through a watch channel after every state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectorStatus {
    pub state: CycleState,
    pub last_cycle: Option<CycleSummary>,
}

pub struct MetricsCollector {
    querier: ContractQuerier,
    external: Arc<dyn ExternalSource>,
    reference: Arc<ReferenceData>,
    store: Arc<dyn SnapshotStore>,
    contracts: ContractSettings,
    sources: ExternalSettings,
    settings: CollectorSettings,
    status_tx: watch::Sender<CollectorStatus>,
}

impl MetricsCollector {
    pub fn new(
        querier: ContractQuerier,
        external: Arc<dyn ExternalSource>,
        reference: Arc<ReferenceData>,
        store: Arc<dyn SnapshotStore>,
        contracts: ContractSettings,
        sources: ExternalSettings,
        settings: CollectorSettings,
    ) -> Self {
        let (status_tx, _) = watch::channel(CollectorStatus::default());
        Self { querier, external, reference, store, contracts, sources, settings, status_tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<CollectorStatus> {
        self.status_tx.subscribe()
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    fn publish_state(&self, state: CycleState) {
        self.status_tx.send_modify(|status| status.state = state);
    }

    /// Run one full cycle: derive, stage, commit.
    ///
    /// The outcome is returned and published; a failed cycle persists nothing.
    pub async fn run_cycle(&self) -> CycleSummary {
        let start = Instant::now();
        let timestamp = Utc::now();
        self.publish_state(CycleState::Collecting);
        info!("Starting collection cycle at {}", timestamp);

        let cycle_timeout = self.settings.cycle_timeout();
        let outcome = match tokio::time::timeout(cycle_timeout, self.collect(timestamp)).await {
            Ok((batch, failed)) => self.commit(batch, failed).await,
            Err(_) => Err((CollectorError::Timeout(cycle_timeout), Vec::new())),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let summary = match outcome {
            Ok((batch, failed)) => {
                info!(
                    "Committed cycle {}: {} records across {} categories, {} LP pools in {}ms",
                    timestamp,
                    batch.record_count(),
                    batch.snapshots().len(),
                    batch.lp_pools().len(),
                    duration_ms
                );
                CycleSummary {
                    timestamp,
                    state: CycleState::Committed,
                    collected: batch.snapshots().iter().map(|s| s.category).collect(),
                    failed,
                    records: batch.record_count(),
                    lp_pools: batch.lp_pools().len(),
                    error: None,
                    duration_ms,
                }
            },
            Err((e, failed)) => {
                error!("Collection cycle {} failed: {}", timestamp, e);
                CycleSummary {
                    timestamp,
                    state: CycleState::Failed,
                    collected: Vec::new(),
                    failed,
                    records: 0,
                    lp_pools: 0,
                    error: Some(e.to_string()),
                    duration_ms,
                }
            },
        };

        self.status_tx.send_modify(|status| {
            status.state = summary.state;
            status.last_cycle = Some(summary.clone());
        });
        self.publish_state(CycleState::Idle);

        summary
    }

    async fn commit(
        &self,
        batch: CycleBatch,
        failed: Vec<String>,
    ) -> Result<(CycleBatch, Vec<String>), (CollectorError, Vec<String>)> {
        if batch.is_empty() {
            return Err((CollectorError::NothingCollected, failed));
        }
        match self.store.commit(&batch).await {
            Ok(()) => Ok((batch, failed)),
            Err(e) => Err((e, failed)),
        }
    }

    /// Derive every category concurrently and stage the successes.
    async fn collect(&self, timestamp: DateTime<Utc>) -> (CycleBatch, Vec<String>) {
        let (
            market_data,
            borrow_rates,
            lending_rates,
            market_amounts,
            collateral,
            ntoken_supply,
            token_prices,
            ntoken_executes,
            market_executes,
            nept,
            lp,
        ) = tokio::join!(
            self.bounded(self.market_data()),
            self.bounded(self.rates(rates::borrow_rates_query(), MetricCategory::BorrowRates)),
            self.bounded(self.rates(rates::lending_rates_query(), MetricCategory::LendingRates)),
            self.bounded(self.market_amounts()),
            self.bounded(self.collateral_amounts()),
            self.bounded(self.ntoken_supply()),
            self.bounded(self.token_prices()),
            self.bounded(self.ntoken_executes()),
            self.bounded(self.market_executes()),
            self.bounded(self.nept_data()),
            self.bounded(self.lp_pools(timestamp)),
        );

        let mut batch = CycleBatch::new(timestamp);
        let mut failed = Vec::new();

        let tasks = [
            ("market_data", market_data),
            ("borrow_rates", borrow_rates),
            ("lending_rates", lending_rates),
            ("market_amounts", market_amounts),
            ("collateral_amounts", collateral),
            ("ntoken_supply", ntoken_supply),
            ("token_prices", token_prices),
            ("ntoken_executes", ntoken_executes),
            ("market_executes", market_executes),
        ];
        for (name, result) in tasks {
            match result {
                Ok(staged) => staged.into_iter().for_each(|(c, p)| batch.add_metrics(c, p)),
                Err(e) => {
                    error!("Failed to collect {}: {}", name, e);
                    failed.push(name.to_string());
                },
            }
        }

        match nept {
            Ok(staged) => staged.into_iter().for_each(|(c, p)| batch.add_metrics(c, p)),
            Err(e) => {
                error!("Failed to collect NEPT staking data: {}", e);
                failed.push("nept_data".to_string());
            },
        }

        match lp {
            Ok(pools) => {
                let dropped = batch.add_lp_pools(pools);
                if dropped > 0 {
                    warn!("Dropped {} duplicate LP pool records", dropped);
                }
            },
            Err(e) => {
                error!("Failed to collect LP pools: {}", e);
                failed.push("lp_pools".to_string());
            },
        }

        (batch, failed)
    }

    /// Apply the per-category deadline to one derivation.
    async fn bounded<T>(
        &self,
        work: impl Future<Output = CollectorResult<T>>,
    ) -> CollectorResult<T> {
        let limit = self.settings.category_timeout();
        tokio::time::timeout(limit, work)
            .await
            .unwrap_or_else(|_| Err(CollectorError::Timeout(limit)))
    }

    // ============================================
    // Categories
    // ============================================

    async fn market_data(&self) -> CollectorResult<Staged> {
        let accounts = self
            .querier
            .enumerate_all(
                &self.contracts.market,
                self.settings.account_page_size,
                accounts::accounts_page_query,
                accounts::account_cursor,
            )
            .await?;
        let census = AccountCensus::from_accounts(&accounts)?;
        info!(
            "Counted {} borrow accounts across {} addresses",
            census.total_accounts, census.unique_addresses
        );
        Ok(vec![(MetricCategory::MarketData, census.payload())])
    }

    async fn rates(&self, query: Value, category: MetricCategory) -> CollectorResult<Staged> {
        let tokens = self.reference.load_tokens().await;
        let raw = self.querier.query(&self.contracts.interest_model, &query).await?;
        Ok(vec![(category, rates::derive_rates(&raw, tokens)?)])
    }

    async fn market_amounts(&self) -> CollectorResult<Staged> {
        let tokens = self.reference.load_tokens().await;
        let raw = self
            .querier
            .query(&self.contracts.market, &amounts::all_markets_query())
            .await?;
        let derived = amounts::derive_market_amounts(&raw, tokens)?;
        Ok(vec![
            (MetricCategory::LentAmounts, derived.lent),
            (MetricCategory::BorrowedAmounts, derived.borrowed),
        ])
    }

    async fn collateral_amounts(&self) -> CollectorResult<Staged> {
        let tokens = self.reference.load_tokens().await;
        let raw = self
            .querier
            .query(&self.contracts.market, &amounts::collateral_totals_query())
            .await?;
        Ok(vec![(MetricCategory::CollateralAmounts, amounts::derive_collateral_amounts(&raw, tokens)?)])
    }

    /// One supply per nToken; a failed fetch records 0 for that nToken only.
    async fn ntoken_supply(&self) -> CollectorResult<Staged> {
        let base = &self.sources.api_base_url;
        let bodies = join_all(self.sources.ntokens.iter().map(|ntoken| async move {
            (ntoken, self.external.fetch_text(&supply::ntoken_supply_url(base, ntoken)).await)
        }))
        .await;

        let payload = bodies
            .into_iter()
            .map(|(ntoken, body)| {
                let value = match body {
                    Ok(body) => supply::numeric_or_zero(&format!("{} supply", ntoken), &body),
                    Err(e) => {
                        warn!("{} supply fetch failed, recording 0: {}", ntoken, e);
                        0.0
                    },
                };
                (ntoken.clone(), MetricValue::tokens(value))
            })
            .collect();
        Ok(vec![(MetricCategory::NTokenSupply, payload)])
    }

    async fn token_prices(&self) -> CollectorResult<Staged> {
        let tokens = self.reference.load_tokens().await;
        let oracle = &self.contracts.oracle;

        let quoted = try_join_all(tokens.iter().map(|token| async move {
            let raw = self.querier.query(oracle, &prices::price_query(token)).await?;
            Ok::<_, CollectorError>((token.ticker.clone(), prices::derive_price(&raw)?))
        }))
        .await?;

        let payload = quoted.into_iter().map(|(ticker, p)| (ticker, MetricValue::usd(p))).collect();
        Ok(vec![(MetricCategory::TokenPrices, payload)])
    }

    async fn ntoken_executes(&self) -> CollectorResult<Staged> {
        let tokens = self.reference.load_tokens().await;
        let contracts: Vec<_> =
            tokens.iter().filter(|t| t.token_type == TokenType::Contract).collect();

        let metadata =
            try_join_all(contracts.iter().map(|t| self.querier.metadata(&t.denom))).await?;
        let payload = executes::executes_payload(
            contracts.iter().map(|t| t.ticker.as_str()).zip(metadata.iter()),
        );
        Ok(vec![(MetricCategory::NTokenExecutes, payload)])
    }

    async fn market_executes(&self) -> CollectorResult<Staged> {
        let tracked = self.contracts.tracked();
        let metadata =
            try_join_all(tracked.iter().map(|(_, address)| self.querier.metadata(address))).await?;
        let payload =
            executes::executes_payload(tracked.iter().map(|(name, _)| *name).zip(metadata.iter()));
        Ok(vec![(MetricCategory::MarketExecutes, payload)])
    }

    /// Emission, staking pools and NEPT circulating supply.
    async fn nept_data(&self) -> CollectorResult<Staged> {
        let pools = self.reference.load_staking_pools().await;
        let contract = &self.contracts.staking;
        let (params_query, state_query) = (staking::params_query(), staking::state_query());
        let supply_url = supply::nept_supply_url(&self.sources.api_base_url);

        let (params, state, circulating) = tokio::join!(
            self.querier.query(contract, &params_query),
            self.querier.query(contract, &state_query),
            self.external.fetch_text(&supply_url),
        );
        let metrics = staking::derive_staking(&params?, &state?, pools)?;

        let mut nept = MetricPayload::from([
            ("emission_rate".to_string(), MetricValue::tokens(metrics.emission_rate)),
            ("total_bonded".to_string(), MetricValue::tokens(metrics.total_bonded)),
            ("average_staking_apr".to_string(), MetricValue::percent(metrics.average_apr)),
        ]);
        match circulating {
            Ok(body) => {
                let supply = supply::numeric_or_zero("NEPT circulating supply", &body);
                nept.insert("circulating_supply".to_string(), MetricValue::tokens(supply));
            },
            Err(e) => error!("Failed to fetch NEPT circulating supply: {}", e),
        }

        Ok(vec![
            (MetricCategory::NeptData, nept),
            (MetricCategory::StakingAmounts, metrics.amounts),
            (MetricCategory::StakingRates, metrics.rates),
        ])
    }

    async fn lp_pools(
        &self,
        timestamp: DateTime<Utc>,
    ) -> CollectorResult<Vec<LpPoolSnapshot>> {
        let Some(url) = &self.sources.lp_pools_url else {
            return Ok(Vec::new());
        };
        let raw = self.external.fetch_json(url).await?;
        lp_pools::derive_lp_pools(&raw, timestamp)
    }
}
