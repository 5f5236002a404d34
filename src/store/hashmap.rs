use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{StoreDocument, StoreError};
use crate::mapping::{MapKey, MappingStore, RemoteId};
use crate::queue::{QueueStore, QueuedEvent, QueuedEventStatus};

/// In-memory store for queued events and identifier mappings.
///
/// Cloning creates another handle to the same storage.
#[derive(Clone, Default)]
pub struct HashMapStore {
    document: Arc<RwLock<StoreDocument>>,
}

impl HashMapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued event records, terminal ones included.
    pub fn event_count(&self) -> Result<usize, StoreError> {
        let document = self
            .document
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(document.events.len())
    }
}

#[async_trait]
impl QueueStore for HashMapStore {
    async fn insert(&self, event: &QueuedEvent) -> Result<(), StoreError> {
        let mut document = self
            .document
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        document.insert_event(event);
        Ok(())
    }

    async fn update(&self, event: &QueuedEvent) -> Result<(), StoreError> {
        let mut document = self
            .document
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        document.update_event(event)
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut document = self
            .document
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        document.events.remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<QueuedEvent>, StoreError> {
        let document = self
            .document
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(document.events.get(id).cloned())
    }

    async fn dispatchable(&self, now: u64) -> Result<Vec<QueuedEvent>, StoreError> {
        let document = self
            .document
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(document.dispatchable(now))
    }

    async fn by_status(&self, status: QueuedEventStatus) -> Result<Vec<QueuedEvent>, StoreError> {
        let document = self
            .document
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(document.events_where(|event| event.status == status))
    }
}

#[async_trait]
impl MappingStore for HashMapStore {
    async fn get(&self, key: &MapKey) -> Result<Option<RemoteId>, StoreError> {
        let document = self
            .document
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(document.get_mapping(key))
    }

    async fn set(&self, key: &MapKey, value: RemoteId) -> Result<(), StoreError> {
        let mut document = self
            .document
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        document.set_mapping(key, value);
        Ok(())
    }
}
