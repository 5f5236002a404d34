use async_trait::async_trait;

use super::{CheckOff, QueuedEvent};

/// Receiver of `"<type>-attempt"` dispatches.
///
/// The set of event types is fixed when the queue is built; enqueueing any
/// other type is rejected. Every call gets a [`CheckOff`] token that must be
/// used to conclude the attempt. A token that is dropped unused (including by
/// a panic) counts as an unacknowledged attempt and is retried.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    fn event_types(&self) -> Vec<String>;

    async fn handle(&self, event: QueuedEvent, check_off: CheckOff);
}
