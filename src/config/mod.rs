#[allow(clippy::module_inception)]
mod config;

pub use self::config::{
    ChainSettings, CollectorSettings, ContractSettings, ExternalSettings, PostgresSettings,
    Settings,
};
