use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, debug_span, error, info, trace, warn, Instrument};

use super::{
    CheckOff, EventHandler, NoticeKind, QueueConfig, QueueError, QueueNotice, QueueObserver,
    QueueStore, QueuedEvent, QueuedEventStatus, Settlement,
};
use crate::clock::Clock;
use crate::error::ConfigError;

const UNACKNOWLEDGED: &str = "attempt ended without being checked off";
const LEASE_EXPIRED: &str = "attempt lease expired before it was checked off";

/// How an attempt concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Done,
    Retry(String),
}

/// Counts from one dispatch sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Attempts handed to the handler.
    pub dispatched: usize,
    /// Events that ran out of attempts during the sweep.
    pub failed: usize,
    /// Unacknowledged attempts (orphaned tokens, expired leases) returned to the schedule.
    pub recovered: usize,
}

pub(crate) struct QueueShared {
    config: QueueConfig,
    store: Arc<dyn QueueStore>,
    handler: Arc<dyn EventHandler>,
    event_types: HashSet<String>,
    observers: Vec<Arc<dyn QueueObserver>>,
    clock: Clock,
    /// Serializes every read-modify-write on a stored record.
    transitions: tokio::sync::Mutex<()>,
    orphans: Mutex<Vec<(String, u32)>>,
    running: Mutex<JoinSet<()>>,
    pub(crate) wake: Notify,
}

impl QueueShared {
    fn emit(&self, kind: NoticeKind, event: &QueuedEvent) {
        let notice = QueueNotice::new(kind, event.clone());
        for observer in &self.observers {
            observer.notify(&notice);
        }
    }

    pub(crate) fn orphan(&self, event_id: &str, attempt: u32) {
        match self.orphans.lock() {
            Ok(mut orphans) => orphans.push((event_id.to_string(), attempt)),
            // The lease sweep still picks the attempt up.
            Err(_) => warn!(event_id, attempt, "orphan list poisoned"),
        }
    }

    fn take_orphans(&self) -> Vec<(String, u32)> {
        match self.orphans.lock() {
            Ok(mut orphans) => std::mem::take(&mut *orphans),
            Err(_) => Vec::new(),
        }
    }

    async fn recover_orphans(&self) -> Result<usize, QueueError> {
        let mut recovered = 0;
        for (event_id, attempt) in self.take_orphans() {
            warn!(event_id = %event_id, attempt, "handler dropped its check-off, rescheduling");
            let settlement = self
                .settle(&event_id, attempt, Outcome::Retry(UNACKNOWLEDGED.to_string()))
                .await?;
            if settlement != Settlement::Stale {
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn persist_terminal(&self, event: &QueuedEvent) -> Result<(), QueueError> {
        if self.config.retain_terminal {
            self.store.update(event).await?;
        } else {
            self.store.remove(&event.id).await?;
        }
        Ok(())
    }

    /// Return an in-flight event to the schedule, or fail it when out of attempts.
    /// Caller holds the transition lock.
    async fn retry_or_fail(
        &self,
        mut event: QueuedEvent,
        error: String,
        now: u64,
    ) -> Result<(Settlement, QueuedEvent), QueueError> {
        if event.attempts >= self.config.max_attempts {
            event.fail(Some(error));
            self.persist_terminal(&event).await?;
            return Ok((Settlement::Failed, event));
        }

        let delay = self.config.retry_delay(event.attempts, &mut rand::thread_rng());
        let next_attempt_at = now.saturating_add(delay);
        event.release(next_attempt_at, Some(error));
        self.store.update(&event).await?;
        Ok((Settlement::Rescheduled { next_attempt_at }, event))
    }

    pub(crate) async fn settle(
        &self,
        event_id: &str,
        attempt: u32,
        outcome: Outcome,
    ) -> Result<Settlement, QueueError> {
        let (settlement, event) = {
            let _transition = self.transitions.lock().await;

            let event = match self.store.get(event_id).await? {
                Some(event) if event.is_in_flight() && event.attempts == attempt => event,
                Some(event) => {
                    warn!(
                        event_id,
                        attempt,
                        status = ?event.status,
                        stored_attempts = event.attempts,
                        "ignoring stale check-off"
                    );
                    return Ok(Settlement::Stale);
                }
                None => {
                    warn!(event_id, attempt, "check-off for unknown event");
                    return Ok(Settlement::Stale);
                }
            };

            let now = self.clock.now_millis();
            match outcome {
                Outcome::Done => {
                    let mut event = event;
                    event.complete();
                    self.persist_terminal(&event).await?;
                    (Settlement::Done, event)
                }
                Outcome::Retry(error) => self.retry_or_fail(event, error, now).await?,
            }
        };

        match settlement {
            Settlement::Done => {
                debug!(event_id, event_type = %event.event_type, attempt, "event done");
                self.emit(NoticeKind::Done, &event);
            }
            Settlement::Failed => {
                warn!(
                    event_id,
                    event_type = %event.event_type,
                    attempts = event.attempts,
                    error = event.last_error.as_deref().unwrap_or_default(),
                    "event failed permanently"
                );
                self.emit(NoticeKind::Fail, &event);
            }
            Settlement::Rescheduled { next_attempt_at } => {
                debug!(
                    event_id,
                    event_type = %event.event_type,
                    attempt,
                    next_attempt_at,
                    error = event.last_error.as_deref().unwrap_or_default(),
                    "event rescheduled"
                );
            }
            Settlement::Stale => {}
        }

        Ok(settlement)
    }

    /// Push the lease of a still-running attempt forward by a full lease.
    pub(crate) async fn renew(&self, event_id: &str, attempt: u32) -> Result<bool, QueueError> {
        let _transition = self.transitions.lock().await;

        let mut event = match self.store.get(event_id).await? {
            Some(event) if event.is_in_flight() && event.attempts == attempt => event,
            _ => return Ok(false),
        };
        event.renew_lease(self.clock.now_millis(), self.config.lease);
        self.store.update(&event).await?;
        trace!(event_id, attempt, leased_until = ?event.leased_until, "attempt lease renewed");
        Ok(true)
    }

    pub(crate) fn lease(&self) -> Duration {
        Duration::from_millis(self.config.lease)
    }

    fn reap_finished(&self) {
        let Ok(mut running) = self.running.lock() else {
            return;
        };
        while let Some(result) = running.try_join_next() {
            if let Err(err) = result {
                if err.is_panic() {
                    error!("event handler panicked");
                }
            }
        }
    }

    fn spawn_attempt(self: &Arc<Self>, event: QueuedEvent) {
        let check_off = CheckOff::new(Arc::clone(self), event.id.clone(), event.attempts);
        let handler = Arc::clone(&self.handler);
        let span = debug_span!(
            "attempt",
            event_id = %event.id,
            event_type = %event.event_type,
            attempt = event.attempts
        );
        match self.running.lock() {
            Ok(mut running) => {
                running.spawn(async move { handler.handle(event, check_off).await }.instrument(span));
            }
            Err(_) => {
                // Dropping `check_off` here orphans the attempt; recovered next sweep.
                error!(event_id = %event.id, "handler task set poisoned, attempt not started");
            }
        }
    }
}

/// Durable retrying delivery queue.
///
/// Events are accepted by [`enqueue`](EventQueue::enqueue), dispatched by
/// [`process_due`](EventQueue::process_due) (usually driven by a
/// [`QueueWorker`](super::QueueWorker)) and concluded by the handler through a
/// [`CheckOff`]. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct EventQueue {
    shared: Arc<QueueShared>,
}

/// Builder for [`EventQueue`].
pub struct EventQueueBuilder {
    config: QueueConfig,
    store: Arc<dyn QueueStore>,
    observers: Vec<Arc<dyn QueueObserver>>,
    clock: Clock,
}

impl EventQueueBuilder {
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn QueueObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self, handler: Arc<dyn EventHandler>) -> Result<EventQueue, ConfigError> {
        self.config.validate()?;
        let event_types: HashSet<String> = handler.event_types().into_iter().collect();
        if event_types.is_empty() {
            return Err(ConfigError::Invalid("event handler declares no event types".into()));
        }

        Ok(EventQueue {
            shared: Arc::new(QueueShared {
                config: self.config,
                store: self.store,
                handler,
                event_types,
                observers: self.observers,
                clock: self.clock,
                transitions: tokio::sync::Mutex::new(()),
                orphans: Mutex::new(Vec::new()),
                running: Mutex::new(JoinSet::new()),
                wake: Notify::new(),
            }),
        })
    }
}

impl EventQueue {
    pub fn builder(store: Arc<dyn QueueStore>) -> EventQueueBuilder {
        EventQueueBuilder {
            config: QueueConfig::default(),
            store,
            observers: Vec::new(),
            clock: Clock::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    pub fn clock(&self) -> &Clock {
        &self.shared.clock
    }

    pub fn supports(&self, event_type: &str) -> bool {
        self.shared.event_types.contains(event_type)
    }

    pub(crate) fn shared(&self) -> &Arc<QueueShared> {
        &self.shared
    }

    /// Queue `payload` for delivery as `event_type`.
    ///
    /// The payload is not inspected. The record is due immediately and the
    /// dispatch loop is woken so the first attempt does not wait for a tick.
    pub async fn enqueue<T: Serialize>(
        &self,
        event_type: &str,
        payload: &T,
    ) -> Result<QueuedEvent, QueueError> {
        if !self.supports(event_type) {
            return Err(QueueError::UnsupportedEventType(event_type.to_string()));
        }

        let now = self.shared.clock.now_millis();
        let event = QueuedEvent::encode(event_type, payload, now).map_err(|err| QueueError::Encode {
            event_type: event_type.to_string(),
            message: err.to_string(),
        })?;

        self.shared.store.insert(&event).await?;
        debug!(event_id = %event.id, event_type, "event enqueued");
        self.shared.wake.notify_one();

        Ok(event)
    }

    /// Run one dispatch sweep.
    ///
    /// Unacknowledged attempts are rescheduled first. Then every due pending
    /// event is either failed (out of attempts) or claimed and handed to the
    /// handler on its own task. Returns without waiting for the handlers.
    pub async fn process_due(&self) -> Result<DispatchReport, QueueError> {
        let shared = &self.shared;
        shared.reap_finished();

        let mut report = DispatchReport {
            recovered: shared.recover_orphans().await?,
            ..Default::default()
        };

        let now = shared.clock.now_millis();
        for candidate in shared.store.dispatchable(now).await? {
            let claimed = {
                let _transition = shared.transitions.lock().await;

                // Re-read: a check-off may have landed since the scan.
                let Some(mut event) = shared.store.get(&candidate.id).await? else {
                    continue;
                };

                if event.is_in_flight() {
                    if !event.lease_expired(now) {
                        continue;
                    }
                    warn!(event_id = %event.id, attempts = event.attempts, "attempt lease expired, rescheduling");
                    let (settlement, event) = shared
                        .retry_or_fail(event, LEASE_EXPIRED.to_string(), now)
                        .await?;
                    report.recovered += 1;
                    if settlement == Settlement::Failed {
                        report.failed += 1;
                        shared.emit(NoticeKind::Fail, &event);
                    }
                    continue;
                }

                if !event.is_pending() || event.next_attempt_at > now {
                    continue;
                }

                if event.attempts >= shared.config.max_attempts {
                    event.fail(None);
                    shared.persist_terminal(&event).await?;
                    warn!(event_id = %event.id, attempts = event.attempts, "event out of attempts");
                    report.failed += 1;
                    shared.emit(NoticeKind::Fail, &event);
                    continue;
                }

                event.claim(now, shared.config.lease);
                shared.store.update(&event).await?;
                event
            };

            debug!(
                event_id = %claimed.id,
                event_type = %claimed.event_type,
                attempt = claimed.attempts,
                "dispatching attempt"
            );
            shared.emit(NoticeKind::Attempt, &claimed);
            shared.spawn_attempt(claimed);
            report.dispatched += 1;
        }

        if report != DispatchReport::default() {
            info!(
                dispatched = report.dispatched,
                failed = report.failed,
                recovered = report.recovered,
                "queue sweep finished"
            );
        }

        Ok(report)
    }

    /// Wait for every running handler task, then reschedule attempts whose
    /// tokens were dropped unused.
    pub async fn wait_idle(&self) -> Result<usize, QueueError> {
        loop {
            let mut running = match self.shared.running.lock() {
                Ok(mut running) => std::mem::take(&mut *running),
                Err(_) => JoinSet::new(),
            };
            if running.is_empty() {
                break;
            }
            while let Some(result) = running.join_next().await {
                if let Err(err) = result {
                    if err.is_panic() {
                        error!("event handler panicked");
                    }
                }
            }
        }
        self.shared.recover_orphans().await
    }

    /// Dispatch and wait until the handlers of this sweep concluded.
    pub async fn run_once(&self) -> Result<DispatchReport, QueueError> {
        let mut report = self.process_due().await?;
        report.recovered += self.wait_idle().await?;
        Ok(report)
    }

    pub async fn get(&self, id: &str) -> Result<Option<QueuedEvent>, QueueError> {
        Ok(self.shared.store.get(id).await?)
    }

    pub async fn events_by_status(
        &self,
        status: QueuedEventStatus,
    ) -> Result<Vec<QueuedEvent>, QueueError> {
        Ok(self.shared.store.by_status(status).await?)
    }
}
