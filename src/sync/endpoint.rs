use std::sync::Arc;

use tracing::{debug, info};

use super::domain::{Annotation, Reply};
use super::identity::{EndpointIdentity, EndpointRecord};
use super::render::Renderer;
use crate::config::{PlaceholderConfig, SyncConfig};
use crate::error::{ConstructionError, SyncError};
use crate::mapping::{IdentifierMap, MappingStore, RemoteId};
use crate::remote::{CommentDraft, IssueDraft, IssueTracker};
use crate::serializer::{CallKey, CallSerializer};

const LANE: &str = "endpoint";

/// One remote repository seen as a sync target.
///
/// Annotations become issues, replies become comments on their annotation's
/// issue. Every operation reads the identifier map, calls the tracker and
/// writes the map back inside the endpoint's serializer lane, so two
/// operations on the same endpoint never interleave.
#[derive(Clone)]
pub struct SyncEndpoint {
    record: EndpointRecord,
    map: IdentifierMap,
    tracker: Arc<dyn IssueTracker>,
    serializer: Arc<CallSerializer>,
    renderer: Renderer,
    placeholder: PlaceholderConfig,
    labels: Vec<String>,
}

impl SyncEndpoint {
    pub fn new(
        record: EndpointRecord,
        config: &SyncConfig,
        tracker: Arc<dyn IssueTracker>,
        mappings: Arc<dyn MappingStore>,
        serializer: Arc<CallSerializer>,
    ) -> Result<Self, ConstructionError> {
        record.ensure_adapter(&config.adapter_id)?;

        let labels = record
            .label
            .clone()
            .or_else(|| config.default_label.clone())
            .into_iter()
            .collect();

        Ok(Self {
            map: IdentifierMap::new(record.identity.clone(), mappings),
            record,
            tracker,
            serializer,
            renderer: Renderer::new(config.instance_name.clone(), config.instance_home.clone()),
            placeholder: config.placeholder.clone(),
            labels,
        })
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn identity(&self) -> &EndpointIdentity {
        &self.record.identity
    }

    pub fn identifier_map(&self) -> &IdentifierMap {
        &self.map
    }

    fn lane(&self) -> CallKey {
        CallKey::new(LANE, self.record.identity.storage_key())
    }

    /// Create the annotation's issue, or overwrite it if one is mapped already.
    pub async fn handle_annotation(&self, annotation: &Annotation) -> Result<RemoteId, SyncError> {
        self.handle_annotation_on_turn(annotation, || {}).await
    }

    /// [`handle_annotation`](Self::handle_annotation), calling `on_turn` once
    /// the endpoint lane is free and the sync is about to start.
    pub async fn handle_annotation_on_turn<H>(
        &self,
        annotation: &Annotation,
        on_turn: H,
    ) -> Result<RemoteId, SyncError>
    where
        H: FnOnce(),
    {
        self.serializer
            .serialize(self.lane(), || {
                on_turn();
                self.sync_annotation(annotation)
            })
            .await
    }

    async fn sync_annotation(&self, annotation: &Annotation) -> Result<RemoteId, SyncError> {
        let existing = self.map.issue_number(&annotation.id).await?;
        let draft = IssueDraft {
            number: existing,
            title: self.renderer.issue_title(annotation),
            body: self.renderer.issue_body(annotation),
            labels: self.labels.clone(),
        };

        let number = self
            .tracker
            .create_or_update_issue(self.identity(), &draft)
            .await?;
        self.map.store_issue_number(&annotation.id, number).await?;

        debug!(
            endpoint = %self.identity(),
            annotation_id = %annotation.id,
            number,
            updated = existing.is_some(),
            "annotation synchronized"
        );
        Ok(number)
    }

    /// Create or overwrite the reply's comment on its annotation's issue.
    ///
    /// If the annotation has no issue yet, a placeholder issue is opened and
    /// mapped to it first.
    pub async fn handle_reply(&self, reply: &Reply) -> Result<RemoteId, SyncError> {
        self.handle_reply_on_turn(reply, || {}).await
    }

    pub async fn handle_reply_on_turn<H>(&self, reply: &Reply, on_turn: H) -> Result<RemoteId, SyncError>
    where
        H: FnOnce(),
    {
        self.serializer
            .serialize(self.lane(), || {
                on_turn();
                self.sync_reply(reply)
            })
            .await
    }

    async fn sync_reply(&self, reply: &Reply) -> Result<RemoteId, SyncError> {
        let number = self.resolve_issue(&reply.parent_id).await?;
        let existing = self.map.comment_id(&reply.id).await?;
        let draft = CommentDraft {
            id: existing,
            number,
            body: self.renderer.comment_body(reply),
        };

        let comment_id = self
            .tracker
            .create_or_update_comment(self.identity(), &draft)
            .await?;
        self.map.store_comment_id(&reply.id, comment_id).await?;

        debug!(
            endpoint = %self.identity(),
            reply_id = %reply.id,
            number,
            comment_id,
            updated = existing.is_some(),
            "reply synchronized"
        );
        Ok(comment_id)
    }

    /// Issue number mapped to `annotation_id`, opening a placeholder issue
    /// when there is none.
    pub async fn ensure_issue_id(&self, annotation_id: &str) -> Result<RemoteId, SyncError> {
        self.serializer
            .serialize(self.lane(), || self.resolve_issue(annotation_id))
            .await
    }

    /// Must run inside the endpoint lane.
    async fn resolve_issue(&self, annotation_id: &str) -> Result<RemoteId, SyncError> {
        if let Some(number) = self.map.issue_number(annotation_id).await? {
            return Ok(number);
        }

        let draft = IssueDraft {
            number: None,
            title: self.placeholder.title.clone(),
            body: self.placeholder.body.clone(),
            labels: Vec::new(),
        };
        let number = self
            .tracker
            .create_or_update_issue(self.identity(), &draft)
            .await?;
        // Stored before the comment is attempted, so a retry reuses this issue.
        self.map.store_issue_number(annotation_id, number).await?;

        info!(
            endpoint = %self.identity(),
            annotation_id,
            number,
            "opened placeholder issue for unsynchronized annotation"
        );
        Ok(number)
    }
}
