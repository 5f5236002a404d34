use thiserror::Error;

/// Errors raised by the queue and mapping persistence layers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("queued event {0} not found")]
    EventNotFound(String),
}
