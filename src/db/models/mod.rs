mod cycle_batch;
mod lp_pool_snapshot;
mod metric_snapshot;

pub use cycle_batch::CycleBatch;
pub use lp_pool_snapshot::LpPoolSnapshot;
pub use metric_snapshot::{MetricCategory, MetricPayload, MetricSnapshot, MetricValue, Unit};
