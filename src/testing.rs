//! In-crate test doubles for the transport, external source and snapshot store,
//! plus a fixture deployment that answers every query a cycle issues.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::{json, Value};

use crate::chain::{ChainTransport, ContractMetadata, ContractQuerier};
use crate::config::{CollectorSettings, ContractSettings, ExternalSettings};
use crate::cron::MetricsCollector;
use crate::db::models::{CycleBatch, LpPoolSnapshot, MetricCategory, MetricSnapshot};
use crate::db::SnapshotStore;
use crate::error::{CollectorError, CollectorResult};
use crate::external::ExternalSource;
use crate::reference::{
    ReferenceData, StakingPoolDescriptor, StakingPoolTable, TokenDescriptor, TokenTable,
    TokenType,
};

pub fn encode_envelope(value: &Value) -> String {
    STANDARD.encode(serde_json::to_vec(value).unwrap())
}

type Handler = Box<dyn Fn(&Value) -> CollectorResult<Value> + Send + Sync>;

/// Routes smart queries by (contract address, top-level query name).
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<FxHashMap<(String, String), Handler>>,
    metadata: Mutex<FxHashMap<String, u64>>,
    queries: Mutex<Vec<Value>>,
    requests: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F>(&self, address: &str, query_name: &str, handler: F)
    where
        F: Fn(&Value) -> CollectorResult<Value> + Send + Sync + 'static,
    {
        self.routes
            .lock()
            .unwrap()
            .insert((address.to_string(), query_name.to_string()), Box::new(handler));
    }

    pub fn respond(&self, address: &str, query_name: &str, response: Value) {
        self.route(address, query_name, move |_| Ok(response.clone()));
    }

    pub fn set_executes(&self, address: &str, executes: u64) {
        self.metadata.lock().unwrap().insert(address.to_string(), executes);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn recorded_queries(&self) -> Vec<Value> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainTransport for MockTransport {
    async fn query_contract_state(&self, address: &str, query: &Value) -> CollectorResult<String> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());

        let name = query
            .as_object()
            .and_then(|o| o.keys().next().cloned())
            .unwrap_or_default();

        let routes = self.routes.lock().unwrap();
        let handler = routes
            .get(&(address.to_string(), name.clone()))
            .ok_or_else(|| CollectorError::transport(format!("no route for {} {}", address, name)))?;
        let response = handler(query)?;
        Ok(encode_envelope(&response))
    }

    async fn query_contract_metadata(&self, address: &str) -> CollectorResult<ContractMetadata> {
        let executes = self.metadata.lock().unwrap().get(address).copied();
        Ok(ContractMetadata { address: address.to_string(), label: None, executes })
    }
}

/// Serves fixed bodies by URL; unknown URLs are transport errors.
#[derive(Default)]
pub struct StaticSource {
    bodies: Mutex<FxHashMap<String, String>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: impl Into<String>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
    }
}

#[async_trait]
impl ExternalSource for StaticSource {
    async fn fetch_text(&self, url: &str) -> CollectorResult<String> {
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| CollectorError::transport(format!("404 for {}", url)))
    }
}

/// Snapshot store kept in memory; can be told to fail commits.
#[derive(Default)]
pub struct MemoryStore {
    batches: Mutex<Vec<CycleBatch>>,
    fail_commits: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn committed(&self) -> Vec<CycleBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn snapshots(&self, category: MetricCategory) -> Vec<MetricSnapshot> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .filter_map(|b| b.snapshot(category).cloned())
            .collect()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn commit(&self, batch: &CycleBatch) -> CollectorResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(CollectorError::Persistence("simulated failure".to_string()));
        }
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }

    async fn latest(&self, category: MetricCategory) -> CollectorResult<Option<MetricSnapshot>> {
        Ok(self.snapshots(category).into_iter().max_by_key(|s| s.timestamp))
    }

    async fn range(
        &self,
        category: MetricCategory,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CollectorResult<Vec<MetricSnapshot>> {
        let mut snapshots: Vec<MetricSnapshot> = self
            .snapshots(category)
            .into_iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .collect();
        snapshots.sort_by_key(|s| s.timestamp);
        Ok(snapshots)
    }

    async fn latest_timestamp(
        &self,
        category: MetricCategory,
    ) -> CollectorResult<Option<DateTime<Utc>>> {
        Ok(self.latest(category).await?.map(|s| s.timestamp))
    }

    async fn latest_lp_pools(&self) -> CollectorResult<Vec<LpPoolSnapshot>> {
        Ok(self
            .batches
            .lock()
            .unwrap()
            .iter()
            .filter(|b| !b.lp_pools().is_empty())
            .max_by_key(|b| b.timestamp())
            .map(|b| b.lp_pools().to_vec())
            .unwrap_or_default())
    }
}

pub fn token(denom: &str, ticker: &str, decimals: u8, token_type: TokenType) -> TokenDescriptor {
    TokenDescriptor {
        denom: denom.to_string(),
        ticker: ticker.to_string(),
        decimals,
        token_type,
    }
}

pub fn token_table(tokens: Vec<TokenDescriptor>) -> TokenTable {
    TokenTable::new(tokens)
}

/// Pools 1..=3 keyed by 30/90/180-day bond durations in nanoseconds.
pub fn staking_pool_table() -> StakingPoolTable {
    StakingPoolTable::new(vec![
        StakingPoolDescriptor { period_id: "2592000000000000".to_string(), pool_number: 1 },
        StakingPoolDescriptor { period_id: "7776000000000000".to_string(), pool_number: 2 },
        StakingPoolDescriptor { period_id: "15552000000000000".to_string(), pool_number: 3 },
    ])
}

pub const API: &str = "https://api.test/v1";
pub const LP_URL: &str = "https://lp.test/pools";

pub fn contract_settings() -> ContractSettings {
    ContractSettings {
        market: "inj1market".to_string(),
        interest_model: "inj1interest".to_string(),
        oracle: "inj1oracle".to_string(),
        staking: "inj1staking".to_string(),
    }
}

pub fn external_settings() -> ExternalSettings {
    ExternalSettings {
        api_base_url: API.to_string(),
        lp_pools_url: Some(LP_URL.to_string()),
        ntokens: vec!["natom".to_string()],
    }
}

pub fn cycle_tokens() -> TokenTable {
    token_table(vec![
        token("ibc/atom", "ATOM", 6, TokenType::Native),
        token("inj1natom", "nATOM", 6, TokenType::Contract),
    ])
}

/// A transport answering every query the cycle issues.
pub fn cycle_transport() -> MockTransport {
    let t = MockTransport::new();
    let atom = json!({"native_token": {"denom": "ibc/atom"}});

    t.respond("inj1market", "get_all_accounts", json!([
        [["inj1a", 0], {}], [["inj1a", 1], {}], [["inj1b", 0], {}]
    ]));
    t.respond("inj1interest", "get_all_borrow_rates", json!([[atom, "0.0512"]]));
    t.respond("inj1interest", "get_all_lending_rates", json!([[atom, "0.031"]]));
    t.respond("inj1market", "get_all_markets", json!([
        [atom, {"lending_principal": "5000000", "debt_pool": {"balance": "2000000"}}]
    ]));
    t.respond("inj1market", "get_all_collateral_totals", json!([[atom, "7000000"]]));
    t.respond("inj1oracle", "get_price", json!({"price": "8.25"}));
    t.respond("inj1staking", "get_params", json!({
        "emission_rate": "600000",
        "bond_duration_settings": [["2592000000000000", {"reward_weight": "1"}]]
    }));
    t.respond("inj1staking", "get_state", json!({
        "bonded": [["2592000000000000", "6000000"]]
    }));
    t.set_executes("inj1natom", 40);
    t.set_executes("inj1market", 1200);
    t
}

/// Supply, NEPT and LP bodies; the LP listing repeats one pool address.
pub fn cycle_source() -> StaticSource {
    let s = StaticSource::new();
    s.serve(&format!("{}/supply/natom", API), "1234.5");
    s.serve(&format!("{}/nept/circulating_supply", API), "N/A");
    s.serve(LP_URL, json!([
        {"pool_address": "inj1pool", "symbol": "A", "liquidity_usd": "10"},
        {"pool_address": "inj1pool", "symbol": "B", "liquidity_usd": "20"}
    ]).to_string());
    s
}

pub fn cycle_collector(
    transport: MockTransport,
    source: Arc<dyn ExternalSource>,
    store: Arc<MemoryStore>,
    sources: ExternalSettings,
    settings: CollectorSettings,
) -> MetricsCollector {
    MetricsCollector::new(
        ContractQuerier::new(Arc::new(transport)),
        source,
        Arc::new(ReferenceData::from_tables(cycle_tokens(), staking_pool_table())),
        store,
        contract_settings(),
        sources,
        settings,
    )
}
