//! Periodic collection scheduler.
//!
//! On startup the scheduler catches up: if the last stored `market_data` snapshot is
//! older than one interval (or there is none) the first cycle runs immediately,
//! otherwise it waits for the remainder of the interval. After the first cycle,
//! cycles run on a fixed period. Cycles never overlap; a cycle that outlasts the
//! period causes the missed ticks to be skipped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::models::MetricCategory;

use super::collector::{CycleState, MetricsCollector};

/// Delay before the first cycle given the last stored snapshot time.
pub fn next_run_delay(
    last_update: Option<DateTime<Utc>>,
    interval: Duration,
    now: DateTime<Utc>,
) -> Duration {
    let Some(last) = last_update else {
        return Duration::ZERO;
    };
    let Ok(interval) = chrono::Duration::from_std(interval) else {
        return Duration::ZERO;
    };

    let due = last + interval;
    if due <= now {
        Duration::ZERO
    } else {
        (due - now).to_std().unwrap_or(Duration::ZERO)
    }
}

pub struct CollectionScheduler {
    collector: Arc<MetricsCollector>,
    alive_tx: watch::Sender<bool>,
}

impl CollectionScheduler {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        let (alive_tx, _) = watch::channel(false);
        Self { collector, alive_tx }
    }

    /// `true` while [`run`](Self::run) is looping. The sender is dropped with the
    /// scheduler, so a panicked task shows up as a closed channel.
    pub fn alive(&self) -> watch::Receiver<bool> {
        self.alive_tx.subscribe()
    }

    /// Runs cycles until cancellation. A cycle in progress is allowed to finish.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let interval = self.collector.settings().interval();

        let store = self.collector.store();
        let last_update = match store.latest_timestamp(MetricCategory::MarketData).await {
            Ok(ts) => ts,
            Err(e) => {
                warn!("Could not read last collection time, collecting now: {}", e);
                None
            },
        };

        let delay = next_run_delay(last_update, interval, Utc::now());
        match last_update {
            Some(ts) => info!(
                "Last collection at {}; first cycle in {}s, then every {}s",
                ts,
                delay.as_secs(),
                interval.as_secs()
            ),
            None => info!("No previous collection; first cycle now, then every {}s", interval.as_secs()),
        }

        let mut ticker = interval_at(Instant::now() + delay, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.alive_tx.send_replace(true);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = ticker.tick() => {},
            }

            let summary = self.collector.run_cycle().await;
            if summary.state == CycleState::Failed {
                error!(
                    "Cycle {} failed; next attempt in {}s",
                    summary.timestamp,
                    interval.as_secs()
                );
            }
        }

        self.alive_tx.send_replace(false);
        info!("Collection scheduler shutting down...");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectorSettings;
    use crate::db::models::{CycleBatch, MetricPayload, MetricValue};
    use crate::db::SnapshotStore;
    use crate::testing::{
        cycle_collector, cycle_source, cycle_transport, external_settings, MemoryStore,
    };
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
    }

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn test_no_previous_snapshot_runs_now() {
        assert_eq!(next_run_delay(None, DAY, at(12, 0)), Duration::ZERO);
    }

    #[test]
    fn test_overdue_runs_now() {
        let last = at(0, 0) - chrono::Duration::days(2);
        assert_eq!(next_run_delay(Some(last), DAY, at(12, 0)), Duration::ZERO);
    }

    #[test]
    fn test_exactly_due_runs_now() {
        let last = at(12, 0) - chrono::Duration::days(1);
        assert_eq!(next_run_delay(Some(last), DAY, at(12, 0)), Duration::ZERO);
    }

    #[test]
    fn test_waits_remaining_interval() {
        let delay = next_run_delay(Some(at(6, 0)), DAY, at(12, 30));
        assert_eq!(delay, Duration::from_secs((17 * 60 + 30) * 60));
    }

    #[test]
    fn test_future_timestamp_waits_full_remaining() {
        let delay = next_run_delay(Some(at(13, 0)), Duration::from_secs(3600), at(12, 0));
        assert_eq!(delay, Duration::from_secs(2 * 3600));
    }

    async fn store_collected_at(last: DateTime<Utc>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut batch = CycleBatch::new(last);
        batch.add_metrics(
            MetricCategory::MarketData,
            MetricPayload::from([("total_accounts".to_string(), MetricValue::count(1))]),
        );
        store.commit(&batch).await.unwrap();
        store
    }

    fn daily_scheduler(store: Arc<MemoryStore>) -> Arc<CollectionScheduler> {
        let collector = cycle_collector(
            cycle_transport(),
            Arc::new(cycle_source()),
            store,
            external_settings(),
            CollectorSettings { interval_minutes: 24 * 60, ..CollectorSettings::default() },
        );
        Arc::new(CollectionScheduler::new(Arc::new(collector)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_snapshot_waits_for_remainder() {
        let store = store_collected_at(Utc::now() - chrono::Duration::hours(1)).await;
        let scheduler = daily_scheduler(store.clone());
        let alive = scheduler.alive();
        let token = CancellationToken::new();

        let runner = scheduler.clone();
        let child = token.clone();
        let handle = tokio::spawn(async move { runner.run(child).await });

        tokio::time::sleep(Duration::from_secs(22 * 3600)).await;
        assert!(*alive.borrow());
        assert_eq!(store.committed().len(), 1);

        tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
        assert_eq!(store.committed().len(), 2);

        token.cancel();
        handle.await.unwrap().unwrap();
        assert!(!*alive.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_snapshot_collects_at_startup() {
        let store = store_collected_at(Utc::now() - chrono::Duration::days(2)).await;
        let scheduler = daily_scheduler(store.clone());
        let token = CancellationToken::new();

        let runner = scheduler.clone();
        let child = token.clone();
        let handle = tokio::spawn(async move { runner.run(child).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.committed().len(), 2);

        tokio::time::sleep(DAY).await;
        assert_eq!(store.committed().len(), 3);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_store_collects_at_startup() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = daily_scheduler(store.clone());
        let token = CancellationToken::new();

        let runner = scheduler.clone();
        let child = token.clone();
        let handle = tokio::spawn(async move { runner.run(child).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.committed().len(), 1);

        token.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(store.committed().len(), 1);
    }
}
