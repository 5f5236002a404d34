//! In-memory issue tracker and fixtures for sync tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docloop_github::{
    Annotation, CommentDraft, DomainEvent, EndpointIdentity, EndpointRecord, IssueDraft,
    IssueTracker, QueueConfig, RemoteError, RemoteId, Reply, Repository, SyncConfig, SyncEngine,
    TargetRef,
};

pub const ENDPOINT: &str = "ep-notes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIssue {
    pub endpoint: EndpointIdentity,
    pub draft: IssueDraft,
}

#[derive(Default)]
struct TrackerState {
    next_issue: RemoteId,
    next_comment: RemoteId,
    issues: BTreeMap<RemoteId, StoredIssue>,
    comments: BTreeMap<RemoteId, CommentDraft>,
    issue_creates: usize,
    issue_updates: usize,
    comment_creates: usize,
    comment_updates: usize,
    failing_issue_calls: usize,
    failing_comment_calls: usize,
    repositories: HashMap<String, Vec<Repository>>,
    listing_calls: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// Issue tracker keeping issues and comments in memory.
///
/// Every call takes `latency` so that concurrent deliveries overlap.
pub struct FakeTracker {
    state: Mutex<TrackerState>,
    latency: Duration,
}

impl FakeTracker {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::from_millis(20))
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TrackerState {
                next_issue: 1,
                next_comment: 1000,
                ..Default::default()
            }),
            latency,
        })
    }

    /// Fail the next `calls` issue calls with a transient error.
    pub fn fail_issue_calls(&self, calls: usize) {
        self.state.lock().unwrap().failing_issue_calls = calls;
    }

    pub fn fail_comment_calls(&self, calls: usize) {
        self.state.lock().unwrap().failing_comment_calls = calls;
    }

    pub fn add_repository(&self, repository: Repository) {
        self.state
            .lock()
            .unwrap()
            .repositories
            .entry(repository.installation_id.clone())
            .or_default()
            .push(repository);
    }

    pub fn issues(&self) -> BTreeMap<RemoteId, StoredIssue> {
        self.state.lock().unwrap().issues.clone()
    }

    pub fn comments(&self) -> BTreeMap<RemoteId, CommentDraft> {
        self.state.lock().unwrap().comments.clone()
    }

    /// `(creates, updates)` of issues.
    pub fn issue_calls(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.issue_creates, state.issue_updates)
    }

    /// `(creates, updates)` of comments.
    pub fn comment_calls(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.comment_creates, state.comment_updates)
    }

    pub fn listing_calls(&self) -> usize {
        self.state.lock().unwrap().listing_calls
    }

    /// Highest number of tracker calls that were running at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    async fn enter(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        tokio::time::sleep(self.latency).await;
    }

    fn leave(&self) {
        self.state.lock().unwrap().in_flight -= 1;
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn create_or_update_issue(
        &self,
        endpoint: &EndpointIdentity,
        draft: &IssueDraft,
    ) -> Result<RemoteId, RemoteError> {
        self.enter().await;
        let result = {
            let mut state = self.state.lock().unwrap();
            if state.failing_issue_calls > 0 {
                state.failing_issue_calls -= 1;
                Err(RemoteError::Transient("502 from tracker".into()))
            } else {
                match draft.number {
                    Some(number) if state.issues.contains_key(&number) => {
                        state.issue_updates += 1;
                        state.issues.insert(
                            number,
                            StoredIssue {
                                endpoint: endpoint.clone(),
                                draft: draft.clone(),
                            },
                        );
                        Ok(number)
                    }
                    Some(number) => Err(RemoteError::Rejected(format!("no issue #{number}"))),
                    None => {
                        let number = state.next_issue;
                        state.next_issue += 1;
                        state.issue_creates += 1;
                        let mut draft = draft.clone();
                        draft.number = Some(number);
                        state.issues.insert(
                            number,
                            StoredIssue {
                                endpoint: endpoint.clone(),
                                draft,
                            },
                        );
                        Ok(number)
                    }
                }
            }
        };
        self.leave();
        result
    }

    async fn create_or_update_comment(
        &self,
        _endpoint: &EndpointIdentity,
        draft: &CommentDraft,
    ) -> Result<RemoteId, RemoteError> {
        self.enter().await;
        let result = {
            let mut state = self.state.lock().unwrap();
            if state.failing_comment_calls > 0 {
                state.failing_comment_calls -= 1;
                Err(RemoteError::Timeout)
            } else if !state.issues.contains_key(&draft.number) {
                Err(RemoteError::Rejected(format!("no issue #{}", draft.number)))
            } else {
                match draft.id {
                    Some(id) => {
                        state.comment_updates += 1;
                        state.comments.insert(id, draft.clone());
                        Ok(id)
                    }
                    None => {
                        let id = state.next_comment;
                        state.next_comment += 1;
                        state.comment_creates += 1;
                        let mut draft = draft.clone();
                        draft.id = Some(id);
                        state.comments.insert(id, draft);
                        Ok(id)
                    }
                }
            }
        };
        self.leave();
        result
    }

    async fn installation_repositories(
        &self,
        installation_id: &str,
    ) -> Result<Vec<Repository>, RemoteError> {
        self.enter().await;
        let repositories = {
            let mut state = self.state.lock().unwrap();
            state.listing_calls += 1;
            state
                .repositories
                .get(installation_id)
                .cloned()
                .unwrap_or_default()
        };
        self.leave();
        Ok(repositories)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn config() -> SyncConfig {
    SyncConfig::default()
        .with_instance("docloop-test", "https://docloop.example")
        .with_placeholder("Placeholder", "Waiting for the annotation.")
        .with_queue(QueueConfig::default().with_spread(0))
}

pub fn identity() -> EndpointIdentity {
    EndpointIdentity::new("someone", "notes", "77").unwrap()
}

pub fn record() -> EndpointRecord {
    EndpointRecord::new(ENDPOINT, "github", identity()).unwrap()
}

/// Engine over an in-memory store with the test endpoint registered.
pub fn engine(tracker: &Arc<FakeTracker>) -> SyncEngine {
    let engine = SyncEngine::builder(tracker.clone())
        .config(config())
        .build()
        .unwrap();
    engine.register_endpoint(record()).unwrap();
    engine
}

pub fn annotation(id: &str, body: &str) -> Annotation {
    Annotation {
        id: id.into(),
        title: format!("Annotation {id}"),
        body: body.into(),
        author: "ana".into(),
        original: format!("https://source.example/{id}"),
        source_name: "source".into(),
        source_home: "https://source.example".into(),
        respective_content: Some("the quoted passage".into()),
    }
}

pub fn reply(id: &str, parent_id: &str, body: &str) -> Reply {
    Reply {
        id: id.into(),
        parent_id: parent_id.into(),
        body: body.into(),
        author: "ben".into(),
        original: format!("https://source.example/{id}"),
        source_name: "source".into(),
        source_home: "https://source.example".into(),
    }
}

pub fn target() -> Option<TargetRef> {
    Some(TargetRef::new("github", ENDPOINT))
}

pub fn annotation_event(annotation: Annotation) -> DomainEvent {
    DomainEvent::Annotation {
        annotation,
        target: target(),
    }
}

pub fn reply_event(reply: Reply) -> DomainEvent {
    DomainEvent::Reply {
        reply,
        target: target(),
    }
}

pub fn repository(name: &str, installation_id: &str) -> Repository {
    Repository {
        name: name.into(),
        full_name: format!("someone/{name}"),
        owner_login: "someone".into(),
        installation_id: installation_id.into(),
        html_url: format!("https://github.com/someone/{name}"),
    }
}
