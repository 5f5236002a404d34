use thiserror::Error;

use crate::queue::QueueError;
use crate::remote::RemoteError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("configuration could not be parsed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A value object was built from incomplete or mismatched input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("adapter mismatch: expected {expected:?}, got {actual:?}")]
    AdapterMismatch { expected: String, actual: String },
}

/// Failure of one synchronization step.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error("no endpoint registered under id {0:?}")]
    UnknownEndpoint(String),

    #[error("job payload could not be decoded: {0}")]
    Payload(String),
}

impl SyncError {
    /// Whether running the same step again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_retryable(),
            SyncError::Store(_) | SyncError::Queue(_) | SyncError::UnknownEndpoint(_) => true,
            SyncError::Construction(_) | SyncError::Payload(_) => false,
        }
    }
}
