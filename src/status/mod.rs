//! Read side: latest and historical snapshots, collector health.
//!
//! Reads go straight to the [`SnapshotStore`] and never wait on a running cycle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::cron::{CollectorStatus, CycleState, CycleSummary};
use crate::db::models::{LpPoolSnapshot, MetricCategory, MetricSnapshot};
use crate::db::SnapshotStore;
use crate::error::CollectorResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Scheduler running but the last cycle failed or nothing was collected yet
    Degraded,
    /// Scheduler is not running
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Latest `market_data` snapshot time
    pub last_update_timestamp: Option<DateTime<Utc>>,
    pub scheduler_alive: bool,
    pub last_cycle: Option<CycleSummary>,
}

pub struct StatusService {
    store: Arc<dyn SnapshotStore>,
    collector: watch::Receiver<CollectorStatus>,
    scheduler: watch::Receiver<bool>,
}

impl StatusService {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        collector: watch::Receiver<CollectorStatus>,
        scheduler: watch::Receiver<bool>,
    ) -> Self {
        Self { store, collector, scheduler }
    }

    pub async fn latest_snapshot(
        &self,
        category: MetricCategory,
    ) -> CollectorResult<Option<MetricSnapshot>> {
        self.store.latest(category).await
    }

    /// Snapshots from the last `days_back` days, oldest first.
    pub async fn historical_snapshots(
        &self,
        category: MetricCategory,
        days_back: u32,
    ) -> CollectorResult<Vec<MetricSnapshot>> {
        let end = Utc::now();
        let start = end - Duration::days(i64::from(days_back));
        self.store.range(category, start, end).await
    }

    pub async fn latest_lp_pools(&self) -> CollectorResult<Vec<LpPoolSnapshot>> {
        self.store.latest_lp_pools().await
    }

    pub async fn health(&self) -> CollectorResult<HealthReport> {
        let last_update_timestamp = self.store.latest_timestamp(MetricCategory::MarketData).await?;
        // A closed channel means the scheduler task is gone.
        let scheduler_alive = self.scheduler.has_changed().is_ok() && *self.scheduler.borrow();
        let last_cycle = self.collector.borrow().last_cycle.clone();

        let last_failed = last_cycle
            .as_ref()
            .is_some_and(|c| c.state == CycleState::Failed);

        let status = if !scheduler_alive {
            HealthStatus::Unhealthy
        } else if last_failed || last_update_timestamp.is_none() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Ok(HealthReport { status, last_update_timestamp, scheduler_alive, last_cycle })
    }
}
