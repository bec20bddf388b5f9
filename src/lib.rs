pub mod chain;
pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod external;
pub mod metrics;
pub mod reference;
pub mod status;
pub mod utils;

#[cfg(test)]
mod testing;

pub use chain::{ContractQuerier, LcdTransport};
pub use config::Settings;
pub use cron::{CollectionScheduler, MetricsCollector};
pub use db::{PostgresClient, SnapshotStore};
pub use error::{CollectorError, CollectorResult};
pub use external::HttpSource;
pub use reference::ReferenceData;
pub use status::StatusService;
