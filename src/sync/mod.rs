//! Delivery of annotations and replies to issue-tracker endpoints.

mod domain;
mod endpoint;
mod engine;
mod identity;
mod registry;
mod render;

pub use domain::{
    Annotation, AnnotationJob, DomainEvent, Reply, ReplyJob, TargetRef, ANNOTATION, REPLY,
};
pub use endpoint::SyncEndpoint;
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use identity::{EndpointIdentity, EndpointRecord};
pub use registry::EndpointRegistry;
pub use render::Renderer;
