use thiserror::Error;

/// Failures that reach callers of the store.
///
/// Transient network trouble is retried and routed around internally; only
/// these classes escape.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no reachable owner for key")]
    Unavailable,

    #[error("{addr} unreachable: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),

    #[error("{0}")]
    State(&'static str),
}

impl StoreError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        StoreError::InvalidRequest(reason.into())
    }
}
