//! Seam to the remote issue tracker.
//!
//! The crate never speaks HTTP itself; a transport implements
//! [`IssueTracker`] and is injected into the engine.

mod error;

pub use error::RemoteError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::mapping::RemoteId;
use crate::sync::EndpointIdentity;

/// Full content of an issue. `number: None` creates, `Some` updates in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDraft {
    pub number: Option<RemoteId>,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Full content of a comment on issue `number`. `id: None` creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub id: Option<RemoteId>,
    pub number: RemoteId,
    pub body: String,
}

/// A repository reachable through an app installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner_login: String,
    pub installation_id: String,
    pub html_url: String,
}

#[async_trait]
pub trait IssueTracker: Send + Sync + 'static {
    /// Create the issue, or overwrite it when `draft.number` is set.
    /// Returns the issue number.
    async fn create_or_update_issue(
        &self,
        endpoint: &EndpointIdentity,
        draft: &IssueDraft,
    ) -> Result<RemoteId, RemoteError>;

    /// Create the comment, or overwrite it when `draft.id` is set.
    /// Returns the comment id.
    async fn create_or_update_comment(
        &self,
        endpoint: &EndpointIdentity,
        draft: &CommentDraft,
    ) -> Result<RemoteId, RemoteError>;

    async fn installation_repositories(
        &self,
        installation_id: &str,
    ) -> Result<Vec<Repository>, RemoteError>;
}
