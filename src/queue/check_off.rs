use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::queue::{Outcome, QueueShared};
use super::QueueError;

/// What a check-off did to the stored record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Done,
    /// Back to pending, due again at the given unix-millis timestamp.
    Rescheduled { next_attempt_at: u64 },
    Failed,
    /// The attempt had already been concluded or swept; nothing changed.
    Stale,
}

/// Acknowledgment token for one dispatched attempt.
///
/// Consumed by [`done`](CheckOff::done) or [`retry`](CheckOff::retry), so an
/// attempt can be acknowledged at most once. Dropping the token unused records
/// the attempt as orphaned; the next sweep treats it like a failed attempt.
pub struct CheckOff {
    shared: Arc<QueueShared>,
    event_id: String,
    attempt: u32,
    settled: bool,
}

impl CheckOff {
    pub(crate) fn new(shared: Arc<QueueShared>, event_id: String, attempt: u32) -> Self {
        Self {
            shared,
            event_id,
            attempt,
            settled: false,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// The attempt number (1-based) this token concludes.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// How long an attempt may go without a check-off or a renewal.
    pub fn lease(&self) -> Duration {
        self.shared.lease()
    }

    /// Restart the attempt's lease from now.
    ///
    /// Returns `false` when the attempt was already concluded or swept, in
    /// which case a later check-off is stale as well.
    pub async fn renew(&self) -> Result<bool, QueueError> {
        self.shared.renew(&self.event_id, self.attempt).await
    }

    /// Mark the event as successfully delivered.
    pub async fn done(mut self) -> Result<Settlement, QueueError> {
        self.settled = true;
        self.shared
            .settle(&self.event_id, self.attempt, Outcome::Done)
            .await
    }

    /// Conclude the attempt as failed; the queue reschedules or fails the event.
    pub async fn retry(mut self, error: impl fmt::Display) -> Result<Settlement, QueueError> {
        self.settled = true;
        self.shared
            .settle(&self.event_id, self.attempt, Outcome::Retry(error.to_string()))
            .await
    }
}

impl fmt::Debug for CheckOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckOff")
            .field("event_id", &self.event_id)
            .field("attempt", &self.attempt)
            .field("settled", &self.settled)
            .finish()
    }
}

impl Drop for CheckOff {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.orphan(&self.event_id, self.attempt);
        }
    }
}
