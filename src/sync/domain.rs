//! Upstream domain events and the jobs they become on the queue.

use serde::{Deserialize, Serialize};

pub const ANNOTATION: &str = "annotation";
pub const REPLY: &str = "reply";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: String,
    /// Link to the annotation in its source.
    pub original: String,
    pub source_name: String,
    pub source_home: String,
    /// The passage of the document the annotation refers to.
    pub respective_content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    /// Id of the annotation this reply belongs to.
    pub parent_id: String,
    pub body: String,
    pub author: String,
    pub original: String,
    pub source_name: String,
    pub source_home: String,
}

/// Where an upstream event should be delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub adapter_id: Option<String>,
    pub endpoint_id: Option<String>,
}

impl TargetRef {
    pub fn new(adapter_id: impl Into<String>, endpoint_id: impl Into<String>) -> Self {
        Self {
            adapter_id: Some(adapter_id.into()),
            endpoint_id: Some(endpoint_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    Annotation {
        annotation: Annotation,
        target: Option<TargetRef>,
    },
    Reply {
        reply: Reply,
        target: Option<TargetRef>,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::Annotation { .. } => ANNOTATION,
            DomainEvent::Reply { .. } => REPLY,
        }
    }

    pub fn target(&self) -> Option<&TargetRef> {
        match self {
            DomainEvent::Annotation { target, .. } | DomainEvent::Reply { target, .. } => {
                target.as_ref()
            }
        }
    }

    /// Id of the annotation or reply carried by this event.
    pub fn subject_id(&self) -> &str {
        match self {
            DomainEvent::Annotation { annotation, .. } => &annotation.id,
            DomainEvent::Reply { reply, .. } => &reply.id,
        }
    }
}

/// Queue payload of an `"annotation"` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationJob {
    pub endpoint_id: String,
    pub annotation: Annotation,
}

/// Queue payload of a `"reply"` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyJob {
    pub endpoint_id: String,
    pub reply: Reply,
}
