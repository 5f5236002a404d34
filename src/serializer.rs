//! Per-key call serialization with optional rate limiting.
//!
//! [`CallSerializer::serialize`] takes a place in line for its key at call
//! time. Calls for the same key run one at a time in that order; calls for
//! different keys run freely. With a minimum spacing, a call also never starts
//! sooner than `min_spacing` after the previous call for its key started.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Identifies a serialization lane: the operation and the key it is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub operation: &'static str,
    pub key: String,
}

impl CallKey {
    pub fn new(operation: &'static str, key: impl Into<String>) -> Self {
        Self {
            operation,
            key: key.into(),
        }
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.operation, self.key)
    }
}

#[derive(Default)]
struct LaneState {
    next_ticket: u64,
    serving: u64,
    /// Tickets whose callers gave up before their turn.
    abandoned: BTreeSet<u64>,
    last_started: Option<Instant>,
}

#[derive(Default)]
struct Lane {
    state: Mutex<LaneState>,
    advanced: Notify,
}

impl Lane {
    fn state(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// No queued calls and, under a spacing, the last start long enough ago.
    fn is_reclaimable(&self, min_spacing: Option<Duration>) -> bool {
        let state = self.state();
        let spaced = match (min_spacing, state.last_started) {
            (Some(spacing), Some(last)) => last.elapsed() >= spacing,
            _ => true,
        };
        state.serving == state.next_ticket && spaced
    }

    async fn wait_turn(&self, ticket: u64) {
        loop {
            let notified = self.advanced.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state().serving == ticket {
                return;
            }
            notified.await;
        }
    }
}

/// Runs calls for the same [`CallKey`] strictly one after another.
#[derive(Default)]
pub struct CallSerializer {
    lanes: Mutex<HashMap<CallKey, Arc<Lane>>>,
    min_spacing: Option<Duration>,
}

impl CallSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require at least `spacing` between the starts of two calls for one key.
    pub fn with_min_spacing(mut self, spacing: Duration) -> Self {
        self.min_spacing = (!spacing.is_zero()).then_some(spacing);
        self
    }

    pub fn min_spacing(&self) -> Option<Duration> {
        self.min_spacing
    }

    /// Number of keys with queued or recently started calls.
    pub fn active_lanes(&self) -> usize {
        self.lanes().len()
    }

    fn lanes(&self) -> MutexGuard<'_, HashMap<CallKey, Arc<Lane>>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` once every earlier call for `key` has completed.
    ///
    /// The place in line is taken when this method is called, not when the
    /// returned future is first polled. Dropping the future before it runs
    /// gives the place up; dropping it while running ends the turn.
    pub fn serialize<'a, F, Fut, T>(&'a self, key: CallKey, f: F) -> impl Future<Output = T> + 'a
    where
        F: FnOnce() -> Fut + 'a,
        Fut: Future<Output = T> + 'a,
        T: 'a,
    {
        let (lane, ticket) = {
            let mut lanes = self.lanes();
            if self.min_spacing.is_some() {
                // Lanes left behind while their spacing was still running.
                lanes.retain(|_, lane| !lane.is_reclaimable(self.min_spacing));
            }
            let lane = Arc::clone(lanes.entry(key.clone()).or_default());
            let mut state = lane.state();
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            drop(state);
            (lane, ticket)
        };

        let turn = Turn {
            serializer: self,
            key,
            lane,
            ticket,
        };

        async move {
            turn.lane.wait_turn(turn.ticket).await;

            let start = {
                let now = Instant::now();
                let mut state = turn.lane.state();
                let start = match (self.min_spacing, state.last_started) {
                    (Some(spacing), Some(last)) => (last + spacing).max(now),
                    _ => now,
                };
                state.last_started = Some(start);
                start
            };
            if start > Instant::now() {
                tracing::trace!(key = %turn.key, "spacing call");
                tokio::time::sleep_until(start).await;
            }

            let output = f().await;
            drop(turn);
            output
        }
    }

    fn release(&self, key: &CallKey, lane: &Arc<Lane>, ticket: u64) {
        let mut lanes = self.lanes();
        let mut state = lane.state();

        if state.serving == ticket {
            state.serving += 1;
            loop {
                let next = state.serving;
                if !state.abandoned.remove(&next) {
                    break;
                }
                state.serving += 1;
            }
            lane.advanced.notify_waiters();
        } else {
            state.abandoned.insert(ticket);
        }
        drop(state);

        let current = lanes.get(key).is_some_and(|current| Arc::ptr_eq(current, lane));
        if current && lane.is_reclaimable(self.min_spacing) {
            lanes.remove(key);
        }
    }
}

/// A held place in a lane. Dropping it ends the turn or gives the place up.
struct Turn<'a> {
    serializer: &'a CallSerializer,
    key: CallKey,
    lane: Arc<Lane>,
    ticket: u64,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.serializer.release(&self.key, &self.lane, self.ticket);
    }
}
