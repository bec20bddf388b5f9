//! Collection cycle and its scheduler.

pub mod collector;
pub mod scheduler;

pub use collector::{CollectorStatus, CycleState, CycleSummary, MetricsCollector};
pub use scheduler::{next_run_delay, CollectionScheduler};
