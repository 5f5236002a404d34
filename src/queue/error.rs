use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no handler registered for event type {0:?}")]
    UnsupportedEventType(String),

    #[error("failed to encode payload for {event_type:?}: {message}")]
    Encode { event_type: String, message: String },
}
