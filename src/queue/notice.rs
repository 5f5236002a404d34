use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{QueuedEvent, QueuedEventStatus};

/// Which transition a notice reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoticeKind {
    Attempt,
    Done,
    Fail,
}

impl NoticeKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            NoticeKind::Attempt => "attempt",
            NoticeKind::Done => "done",
            NoticeKind::Fail => "fail",
        }
    }
}

/// A queue notification, named `"<type>-attempt"`, `"<type>-done"` or `"<type>-fail"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueNotice {
    pub kind: NoticeKind,
    pub event: QueuedEvent,
}

impl QueueNotice {
    pub fn new(kind: NoticeKind, event: QueuedEvent) -> Self {
        Self { kind, event }
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.event.event_type, self.kind.suffix())
    }
}

impl fmt::Display for QueueNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (attempt {})", self.name(), self.event.id, self.event.attempts)
    }
}

/// Synchronous listener for queue notifications.
///
/// Called from the dispatch path, so implementations should hand work off
/// rather than block.
pub trait QueueObserver: Send + Sync {
    fn notify(&self, notice: &QueueNotice);
}

/// Observer forwarding every notice into an unbounded tokio channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<QueueNotice>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueueNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl QueueObserver for ChannelObserver {
    fn notify(&self, notice: &QueueNotice) {
        // A closed receiver only means nobody is listening anymore.
        let _ = self.tx.send(notice.clone());
    }
}

/// Serializable summary of a notice, as emitted through an `EventEmitter`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticePayload {
    pub id: String,
    pub event_type: String,
    pub attempts: u32,
    pub status: QueuedEventStatus,
    pub last_error: Option<String>,
}

impl From<&QueueNotice> for NoticePayload {
    fn from(notice: &QueueNotice) -> Self {
        Self {
            id: notice.event.id.clone(),
            event_type: notice.event.event_type.clone(),
            attempts: notice.event.attempts,
            status: notice.event.status,
            last_error: notice.event.last_error.clone(),
        }
    }
}

/// Observer re-emitting notices on an in-process `EventEmitter` under their
/// `"<type>-<kind>"` name. Requires the `emitter` feature.
#[cfg(feature = "emitter")]
pub struct EmitterObserver {
    emitter: std::sync::Mutex<crate::EventEmitter>,
}

#[cfg(feature = "emitter")]
impl EmitterObserver {
    pub fn new(emitter: crate::EventEmitter) -> Self {
        Self {
            emitter: std::sync::Mutex::new(emitter),
        }
    }
}

#[cfg(feature = "emitter")]
impl QueueObserver for EmitterObserver {
    fn notify(&self, notice: &QueueNotice) {
        match self.emitter.lock() {
            Ok(mut emitter) => {
                // Listeners run on their own threads; nothing to wait for here.
                let _listeners = emitter.emit(&notice.name(), NoticePayload::from(notice));
            }
            Err(_) => tracing::warn!(notice = %notice, "event emitter poisoned, notice dropped"),
        }
    }
}
