use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::StoreError;
use crate::sync::EndpointIdentity;

/// Issue number or comment id on the remote tracker.
pub type RemoteId = u64;

/// The kind of remote resource a domain entity was materialized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Issue,
    Comment,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Issue => "issue",
            ResourceKind::Comment => "comment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key of one mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapKey {
    pub endpoint: EndpointIdentity,
    pub kind: ResourceKind,
    pub domain_id: String,
}

impl MapKey {
    pub fn new(endpoint: EndpointIdentity, kind: ResourceKind, domain_id: impl Into<String>) -> Self {
        Self {
            endpoint,
            kind,
            domain_id: domain_id.into(),
        }
    }
}

/// Point read/write persistence for identifier mappings.
///
/// Implementations must be durable across restarts to honor the
/// one-resource-per-entity guarantee; [`HashMapStore`](crate::HashMapStore)
/// is the in-process exception used by tests and ephemeral setups.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn get(&self, key: &MapKey) -> Result<Option<RemoteId>, StoreError>;

    /// Write `value` for `key`, replacing any previous value for the same key.
    async fn set(&self, key: &MapKey, value: RemoteId) -> Result<(), StoreError>;
}
