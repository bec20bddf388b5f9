use std::time::Duration;

/// Errors raised by the collection pipeline.
///
/// `LookupMiss` and `Conversion` are recovered inside the derivation functions and
/// only surface as log lines. `Transport` and `Decode` abort the category being
/// derived, as does `Timeout` when a single category runs past its deadline.
/// `Persistence`, `NothingCollected` and a cycle-level `Timeout` fail the whole cycle.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("{kind} {key:?} not found in reference data")]
    LookupMiss { kind: &'static str, key: String },

    #[error("could not convert {input:?} to a number")]
    Conversion { input: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("no metrics collected in cycle")]
    NothingCollected,
}

impl CollectorError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

impl From<reqwest::Error> for CollectorError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<base64::DecodeError> for CollectorError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Decode(format!("invalid base64 envelope: {}", e))
    }
}

impl From<serde_json::Error> for CollectorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(format!("invalid JSON payload: {}", e))
    }
}

impl From<tokio_postgres::Error> for CollectorError {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for CollectorError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        Self::Persistence(e.to_string())
    }
}

pub type CollectorResult<T> = Result<T, CollectorError>;
