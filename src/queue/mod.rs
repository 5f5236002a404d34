//! Durable retrying event queue.
//!
//! ```text
//! enqueue ──► Pending ──(due, attempts < max)──► InFlight ──done()──► Done
//!                ▲                                  │
//!                └──────── retry() / dropped ───────┤
//!                          token / lease expiry     └─(attempts >= max)──► Failed
//! ```
//!
//! - [`EventQueue`] owns the schedule and every state transition.
//! - [`EventHandler`] receives `"<type>-attempt"` dispatches with a [`CheckOff`].
//! - [`QueueObserver`]s receive `"<type>-attempt"`, `"<type>-done"` and
//!   `"<type>-fail"` notices.
//! - [`QueueWorker`] drives [`EventQueue::process_due`] in the background.

mod check_off;
mod config;
mod error;
mod event;
mod handler;
mod notice;
#[allow(clippy::module_inception)]
mod queue;
mod store;
mod worker;

pub use check_off::{CheckOff, Settlement};
pub use config::QueueConfig;
pub use error::QueueError;
pub use event::{QueuedEvent, QueuedEventStatus};
pub use handler::EventHandler;
#[cfg(feature = "emitter")]
pub use notice::EmitterObserver;
pub use notice::{ChannelObserver, NoticeKind, NoticePayload, QueueNotice, QueueObserver};
pub use queue::{DispatchReport, EventQueue, EventQueueBuilder};
pub use store::QueueStore;
pub use worker::{QueueWorker, WorkerStats};
