use async_trait::async_trait;

use super::{QueuedEvent, QueuedEventStatus};
use crate::store::StoreError;

/// Durable storage for queue records.
///
/// The queue is the only writer; it serializes its own read-modify-write
/// sequences, so implementations only need point operations to be atomic.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn insert(&self, event: &QueuedEvent) -> Result<(), StoreError>;

    /// Replace an existing record. Fails with [`StoreError::EventNotFound`] when absent.
    async fn update(&self, event: &QueuedEvent) -> Result<(), StoreError>;

    async fn remove(&self, id: &str) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<QueuedEvent>, StoreError>;

    /// Pending records due at `now` plus in-flight records whose lease expired,
    /// oldest schedule first.
    async fn dispatchable(&self, now: u64) -> Result<Vec<QueuedEvent>, StoreError>;

    async fn by_status(&self, status: QueuedEventStatus) -> Result<Vec<QueuedEvent>, StoreError>;
}
