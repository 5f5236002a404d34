use std::sync::Arc;

use super::{MapKey, MappingStore, RemoteId, ResourceKind};
use crate::store::StoreError;
use crate::sync::EndpointIdentity;

/// Identifier map of one remote endpoint.
///
/// A thin typed view over a shared [`MappingStore`]: every read and write is
/// addressed by `(endpoint, kind, domain id)`. Entries are only ever replaced by
/// a later write for the same key; nothing here deletes them.
#[derive(Clone)]
pub struct IdentifierMap {
    endpoint: EndpointIdentity,
    store: Arc<dyn MappingStore>,
}

impl IdentifierMap {
    pub fn new(endpoint: EndpointIdentity, store: Arc<dyn MappingStore>) -> Self {
        Self { endpoint, store }
    }

    pub fn endpoint(&self) -> &EndpointIdentity {
        &self.endpoint
    }

    fn key(&self, kind: ResourceKind, domain_id: &str) -> MapKey {
        MapKey::new(self.endpoint.clone(), kind, domain_id)
    }

    pub async fn get(&self, kind: ResourceKind, domain_id: &str) -> Result<Option<RemoteId>, StoreError> {
        self.store.get(&self.key(kind, domain_id)).await
    }

    pub async fn set(&self, kind: ResourceKind, domain_id: &str, remote_id: RemoteId) -> Result<(), StoreError> {
        tracing::trace!(
            endpoint = %self.endpoint,
            kind = %kind,
            domain_id,
            remote_id,
            "storing identifier mapping"
        );
        self.store.set(&self.key(kind, domain_id), remote_id).await
    }

    pub async fn issue_number(&self, annotation_id: &str) -> Result<Option<RemoteId>, StoreError> {
        self.get(ResourceKind::Issue, annotation_id).await
    }

    pub async fn store_issue_number(&self, annotation_id: &str, number: RemoteId) -> Result<(), StoreError> {
        self.set(ResourceKind::Issue, annotation_id, number).await
    }

    pub async fn comment_id(&self, reply_id: &str) -> Result<Option<RemoteId>, StoreError> {
        self.get(ResourceKind::Comment, reply_id).await
    }

    pub async fn store_comment_id(&self, reply_id: &str, comment_id: RemoteId) -> Result<(), StoreError> {
        self.set(ResourceKind::Comment, reply_id, comment_id).await
    }
}
