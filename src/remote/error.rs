use thiserror::Error;

/// Failure reported by an [`IssueTracker`](super::IssueTracker) call.
///
/// Cloneable so that a single failed call can be shared between coalesced
/// callers of a [`CallCache`](crate::CallCache).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("transient tracker failure: {0}")]
    Transient(String),

    #[error("rate limited by tracker, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("tracker call timed out")]
    Timeout,

    #[error("tracker rejected credentials: {0}")]
    Unauthorized(String),

    #[error("tracker rejected the request: {0}")]
    Rejected(String),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Transient(_) | RemoteError::RateLimited { .. } | RemoteError::Timeout
        )
    }
}
