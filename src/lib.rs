//! Reliable synchronization of annotation and reply events into an issue
//! tracker.
//!
//! Upstream events are accepted by a [`SyncEngine`], persisted in a retrying
//! [`EventQueue`] and delivered to a [`SyncEndpoint`], which keeps an
//! [`IdentifierMap`] so each annotation owns exactly one issue and each reply
//! exactly one comment, however often delivery is retried.

mod cache;
mod clock;
mod config;
mod error;
mod mapping;
mod queue;
mod remote;
mod serializer;
mod store;
mod sync;

pub use cache::CallCache;
pub use clock::Clock;
pub use config::{PlaceholderConfig, SyncConfig};
pub use error::{ConfigError, ConstructionError, SyncError};
pub use mapping::{IdentifierMap, MapKey, MappingStore, RemoteId, ResourceKind};
#[cfg(feature = "emitter")]
pub use queue::EmitterObserver;
pub use queue::{
    ChannelObserver, CheckOff, DispatchReport, EventHandler, EventQueue, EventQueueBuilder,
    NoticeKind, NoticePayload, QueueConfig, QueueError, QueueNotice, QueueObserver, QueueStore,
    QueueWorker, QueuedEvent, QueuedEventStatus, Settlement, WorkerStats,
};
pub use remote::{CommentDraft, IssueDraft, IssueTracker, RemoteError, Repository};
pub use serializer::{CallKey, CallSerializer};
pub use store::{HashMapStore, JsonFileStore, StoreError};
pub use sync::{
    Annotation, AnnotationJob, DomainEvent, EndpointIdentity, EndpointRecord, EndpointRegistry,
    Reply, ReplyJob, Renderer, SyncEndpoint, SyncEngine, SyncEngineBuilder, TargetRef, ANNOTATION,
    REPLY,
};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
