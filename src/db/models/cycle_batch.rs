use chrono::{DateTime, Utc};
use log::warn;
use rustc_hash::FxHashSet;

use super::{LpPoolSnapshot, MetricCategory, MetricPayload, MetricSnapshot};

/// In-memory staging buffer for one collection cycle.
///
/// Every record is stamped with the batch timestamp, so all categories of a cycle
/// can be joined on it. Nothing touches the database until the whole batch is
/// handed to [`SnapshotStore::commit`](crate::db::SnapshotStore::commit).
#[derive(Debug, Clone)]
pub struct CycleBatch {
    timestamp: DateTime<Utc>,
    snapshots: Vec<MetricSnapshot>,
    lp_pools: Vec<LpPoolSnapshot>,
    seen_pools: FxHashSet<String>,
}

impl CycleBatch {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            snapshots: Vec::new(),
            lp_pools: Vec::new(),
            seen_pools: FxHashSet::default(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Stage a category payload. A category staged twice keeps its first payload.
    pub fn add_metrics(&mut self, category: MetricCategory, payload: MetricPayload) {
        if self.snapshots.iter().any(|s| s.category == category) {
            warn!("Category {} already staged for this cycle, ignoring duplicate", category);
            return;
        }
        self.snapshots.push(MetricSnapshot { timestamp: self.timestamp, category, payload });
    }

    /// Stage LP pool records, dropping any pool address already present.
    ///
    /// Returns the number of duplicates dropped.
    pub fn add_lp_pools(&mut self, pools: impl IntoIterator<Item = LpPoolSnapshot>) -> usize {
        let mut dropped = 0;
        for mut pool in pools {
            if !self.seen_pools.insert(pool.pool_address.clone()) {
                warn!("Dropping duplicate LP pool record for {}", pool.pool_address);
                dropped += 1;
                continue;
            }
            pool.timestamp = self.timestamp;
            self.lp_pools.push(pool);
        }
        dropped
    }

    pub fn snapshots(&self) -> &[MetricSnapshot] {
        &self.snapshots
    }

    pub fn lp_pools(&self) -> &[LpPoolSnapshot] {
        &self.lp_pools
    }

    pub fn snapshot(&self, category: MetricCategory) -> Option<&MetricSnapshot> {
        self.snapshots.iter().find(|s| s.category == category)
    }

    pub fn record_count(&self) -> usize {
        self.snapshots.iter().map(|s| s.payload.len()).sum::<usize>() + self.lp_pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::MetricValue;
    use chrono::TimeZone;

    fn lp(address: &str, symbol: &str, liquidity: f64) -> LpPoolSnapshot {
        LpPoolSnapshot {
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            pool_address: address.to_string(),
            symbol: symbol.to_string(),
            liquidity_usd: liquidity,
            volume_usd: 0.0,
            fees_usd: 0.0,
            yield_pool_fees: 0.0,
            yield_astro_rewards: 0.0,
            yield_external_rewards: 0.0,
            yield_total: 0.0,
        }
    }

    #[test]
    fn test_lp_dedup_keeps_first_occurrence() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut batch = CycleBatch::new(ts);

        let dropped = batch.add_lp_pools(vec![
            lp("inj1pool", "NEPT-INJ", 100.0),
            lp("inj1other", "USDT-INJ", 50.0),
            lp("inj1pool", "NEPT-INJ-dup", 999.0),
        ]);

        assert_eq!(dropped, 1);
        assert_eq!(batch.lp_pools().len(), 2);
        let kept = &batch.lp_pools()[0];
        assert_eq!(kept.symbol, "NEPT-INJ");
        assert_eq!(kept.liquidity_usd, 100.0);

        // Dedup also applies across calls
        assert_eq!(batch.add_lp_pools(vec![lp("inj1other", "late", 1.0)]), 1);
        assert_eq!(batch.lp_pools().len(), 2);
    }

    #[test]
    fn test_records_share_cycle_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut batch = CycleBatch::new(ts);

        let mut rates = MetricPayload::new();
        rates.insert("ATOM".to_string(), MetricValue::percent(3.1));
        batch.add_metrics(MetricCategory::BorrowRates, rates);
        batch.add_metrics(MetricCategory::MarketData, MetricPayload::new());
        batch.add_lp_pools(vec![lp("inj1pool", "NEPT-INJ", 1.0)]);

        assert!(batch.snapshots().iter().all(|s| s.timestamp == ts));
        assert!(batch.lp_pools().iter().all(|p| p.timestamp == ts));
        assert_eq!(batch.record_count(), 2);
    }

    #[test]
    fn test_duplicate_category_keeps_first() {
        let mut batch = CycleBatch::new(Utc::now());
        let mut first = MetricPayload::new();
        first.insert("a".to_string(), MetricValue::count(1));
        batch.add_metrics(MetricCategory::MarketData, first);
        batch.add_metrics(MetricCategory::MarketData, MetricPayload::new());

        assert_eq!(batch.snapshots().len(), 1);
        assert_eq!(batch.snapshot(MetricCategory::MarketData).unwrap().payload.len(), 1);
    }
}
