use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CollectorResult;

pub mod models;
pub mod postgres;

pub use models::{CycleBatch, LpPoolSnapshot, MetricCategory, MetricSnapshot};
pub use postgres::PostgresClient;

/// Append-only store for cycle snapshots.
///
/// `commit` is all-or-nothing: either every record of the batch is persisted or,
/// on any error, the transaction is rolled back and nothing is.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn commit(&self, batch: &CycleBatch) -> CollectorResult<()>;

    /// Most recent snapshot of a category.
    async fn latest(&self, category: MetricCategory) -> CollectorResult<Option<MetricSnapshot>>;

    /// Snapshots of a category with `start <= timestamp <= end`, oldest first.
    async fn range(
        &self,
        category: MetricCategory,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CollectorResult<Vec<MetricSnapshot>>;

    async fn latest_timestamp(
        &self,
        category: MetricCategory,
    ) -> CollectorResult<Option<DateTime<Utc>>>;

    /// LP pool records of the most recent cycle that had any.
    async fn latest_lp_pools(&self) -> CollectorResult<Vec<LpPoolSnapshot>>;
}
