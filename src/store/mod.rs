//! Persistence backends for queued events and identifier mappings.
//!
//! Both backends implement [`QueueStore`](crate::queue::QueueStore) and
//! [`MappingStore`](crate::mapping::MappingStore):
//!
//! - [`HashMapStore`] keeps everything in memory. Clones share storage, so one
//!   instance can back the queue and the mappings of a whole engine.
//! - [`JsonFileStore`] keeps the same document in a JSON file and atomically
//!   replaces it on every write, so queue state and mappings survive restarts.

mod error;
mod hashmap;
mod json_file;

pub use error::StoreError;
pub use hashmap::HashMapStore;
pub use json_file::JsonFileStore;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mapping::{MapKey, RemoteId, ResourceKind};
use crate::queue::{QueuedEvent, QueuedEventStatus};

/// Issue and comment maps of a single endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ResourceMaps {
    #[serde(default)]
    pub issues: BTreeMap<String, RemoteId>,
    #[serde(default)]
    pub comments: BTreeMap<String, RemoteId>,
}

impl ResourceMaps {
    fn kind(&self, kind: ResourceKind) -> &BTreeMap<String, RemoteId> {
        match kind {
            ResourceKind::Issue => &self.issues,
            ResourceKind::Comment => &self.comments,
        }
    }

    fn kind_mut(&mut self, kind: ResourceKind) -> &mut BTreeMap<String, RemoteId> {
        match kind {
            ResourceKind::Issue => &mut self.issues,
            ResourceKind::Comment => &mut self.comments,
        }
    }
}

/// The full persisted state shared by both backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreDocument {
    #[serde(default)]
    pub events: BTreeMap<String, QueuedEvent>,
    /// Endpoint storage key -> per-kind maps.
    #[serde(default)]
    pub mappings: BTreeMap<String, ResourceMaps>,
}

impl StoreDocument {
    pub fn insert_event(&mut self, event: &QueuedEvent) {
        self.events.insert(event.id.clone(), event.clone());
    }

    pub fn update_event(&mut self, event: &QueuedEvent) -> Result<(), StoreError> {
        match self.events.get_mut(&event.id) {
            Some(stored) => {
                *stored = event.clone();
                Ok(())
            }
            None => Err(StoreError::EventNotFound(event.id.clone())),
        }
    }

    pub fn events_where(&self, keep: impl Fn(&QueuedEvent) -> bool) -> Vec<QueuedEvent> {
        let mut events: Vec<QueuedEvent> = self.events.values().filter(|e| keep(e)).cloned().collect();
        events.sort_by(|a, b| {
            a.next_attempt_at
                .cmp(&b.next_attempt_at)
                .then(a.created_at.cmp(&b.created_at))
        });
        events
    }

    pub fn dispatchable(&self, now: u64) -> Vec<QueuedEvent> {
        self.events_where(|event| match event.status {
            QueuedEventStatus::Pending => event.next_attempt_at <= now,
            QueuedEventStatus::InFlight => event.lease_expired(now),
            QueuedEventStatus::Done | QueuedEventStatus::Failed => false,
        })
    }

    pub fn get_mapping(&self, key: &MapKey) -> Option<RemoteId> {
        self.mappings
            .get(&key.endpoint.storage_key())
            .and_then(|maps| maps.kind(key.kind).get(&key.domain_id))
            .copied()
    }

    pub fn set_mapping(&mut self, key: &MapKey, value: RemoteId) {
        self.mappings
            .entry(key.endpoint.storage_key())
            .or_default()
            .kind_mut(key.kind)
            .insert(key.domain_id.clone(), value);
    }
}
