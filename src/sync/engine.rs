use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::domain::{AnnotationJob, DomainEvent, ReplyJob, ANNOTATION, REPLY};
use super::endpoint::SyncEndpoint;
use super::identity::{EndpointIdentity, EndpointRecord};
use super::registry::EndpointRegistry;
use crate::cache::CallCache;
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{ConfigError, ConstructionError, SyncError};
use crate::mapping::MappingStore;
use crate::queue::{
    CheckOff, EventHandler, EventQueue, NoticeKind, QueueError, QueueNotice, QueueObserver,
    QueueStore, QueueWorker, QueuedEvent,
};
use crate::remote::{IssueTracker, RemoteError, Repository};
use crate::serializer::CallSerializer;
use crate::store::HashMapStore;

/// Logs the outcome of annotation deliveries.
struct DeliveryLog;

impl QueueObserver for DeliveryLog {
    fn notify(&self, notice: &QueueNotice) {
        if notice.event.event_type != ANNOTATION {
            return;
        }
        match notice.kind {
            NoticeKind::Done => info!(
                event_id = %notice.event.id,
                attempts = notice.event.attempts,
                "annotation delivered"
            ),
            NoticeKind::Fail => warn!(
                event_id = %notice.event.id,
                attempts = notice.event.attempts,
                error = notice.event.last_error.as_deref().unwrap_or_default(),
                "annotation could not be delivered"
            ),
            NoticeKind::Attempt => {}
        }
    }
}

/// The queue's handler: resolves the target endpoint and runs the sync.
struct EngineCore {
    config: SyncConfig,
    registry: EndpointRegistry,
    tracker: Arc<dyn IssueTracker>,
    mappings: Arc<dyn MappingStore>,
    serializer: Arc<CallSerializer>,
    repositories: CallCache<String, Vec<Repository>, RemoteError>,
}

impl EngineCore {
    fn endpoint(&self, id: &str) -> Result<SyncEndpoint, SyncError> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| SyncError::UnknownEndpoint(id.to_string()))?;
        Ok(SyncEndpoint::new(
            record,
            &self.config,
            Arc::clone(&self.tracker),
            Arc::clone(&self.mappings),
            Arc::clone(&self.serializer),
        )?)
    }

    async fn deliver_annotation(
        &self,
        event: &QueuedEvent,
        check_off: &CheckOff,
    ) -> Result<(), SyncError> {
        let job: AnnotationJob = event
            .decode()
            .map_err(|err| SyncError::Payload(err.to_string()))?;
        let endpoint = self.endpoint(&job.endpoint_id)?;

        let (turn_tx, turn_rx) = oneshot::channel();
        let sync = endpoint.handle_annotation_on_turn(&job.annotation, move || {
            let _ = turn_tx.send(());
        });
        hold_lease_until_turn(check_off, turn_rx, sync).await?;
        Ok(())
    }

    /// Failures past endpoint resolution are logged and the reply is dropped.
    async fn deliver_reply(&self, event: &QueuedEvent, check_off: &CheckOff) -> Result<(), SyncError> {
        let job: ReplyJob = event
            .decode()
            .map_err(|err| SyncError::Payload(err.to_string()))?;
        let endpoint = self.endpoint(&job.endpoint_id)?;

        let (turn_tx, turn_rx) = oneshot::channel();
        let sync = endpoint.handle_reply_on_turn(&job.reply, move || {
            let _ = turn_tx.send(());
        });
        if let Err(err) = hold_lease_until_turn(check_off, turn_rx, sync).await {
            error!(
                event_id = %event.id,
                endpoint = %endpoint.identity(),
                reply_id = %job.reply.id,
                error = %err,
                "reply sync failed, dropping reply"
            );
        }
        Ok(())
    }
}

/// Drive `sync` while keeping the attempt lease alive as long as the sync is
/// still queued behind other calls in its endpoint lane.
///
/// Once the lane turn starts the lease is renewed one last time and runs
/// down normally, so a sync that hangs on the tracker still expires.
async fn hold_lease_until_turn<T>(
    check_off: &CheckOff,
    mut turn: oneshot::Receiver<()>,
    sync: impl Future<Output = T>,
) -> T {
    tokio::pin!(sync);
    let every = (check_off.lease() / 2).max(Duration::from_millis(1));
    let mut heartbeat = tokio::time::interval_at(Instant::now() + every, every);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut waiting = true;

    loop {
        tokio::select! {
            output = &mut sync => return output,
            _ = &mut turn, if waiting => {
                waiting = false;
                renew_lease(check_off).await;
            }
            _ = heartbeat.tick(), if waiting => renew_lease(check_off).await,
        }
    }
}

async fn renew_lease(check_off: &CheckOff) {
    match check_off.renew().await {
        Ok(true) => {}
        Ok(false) => debug!(event_id = check_off.event_id(), "attempt concluded before lease renewal"),
        Err(err) => warn!(event_id = check_off.event_id(), error = %err, "could not renew attempt lease"),
    }
}

#[async_trait]
impl EventHandler for EngineCore {
    fn event_types(&self) -> Vec<String> {
        vec![ANNOTATION.to_string(), REPLY.to_string()]
    }

    async fn handle(&self, event: QueuedEvent, check_off: CheckOff) {
        let result = match event.event_type.as_str() {
            ANNOTATION => self.deliver_annotation(&event, &check_off).await,
            REPLY => self.deliver_reply(&event, &check_off).await,
            other => Err(SyncError::Payload(format!("no delivery for event type {other:?}"))),
        };

        let settled = match result {
            Ok(()) => check_off.done().await,
            Err(err) => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    attempt = check_off.attempt(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "delivery attempt failed"
                );
                check_off.retry(err).await
            }
        };

        if let Err(err) = settled {
            // The attempt lease brings the event back.
            error!(event_id = %event.id, error = %err, "could not record attempt outcome");
        }
    }
}

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    config: SyncConfig,
    tracker: Arc<dyn IssueTracker>,
    queue_store: Arc<dyn QueueStore>,
    mappings: Arc<dyn MappingStore>,
    observers: Vec<Arc<dyn QueueObserver>>,
    clock: Clock,
}

impl SyncEngineBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Use one store for both queued events and identifier mappings.
    pub fn store<S>(mut self, store: S) -> Self
    where
        S: QueueStore + MappingStore + 'static,
    {
        let store = Arc::new(store);
        self.queue_store = store.clone();
        self.mappings = store;
        self
    }

    pub fn queue_store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.queue_store = store;
        self
    }

    pub fn mapping_store(mut self, store: Arc<dyn MappingStore>) -> Self {
        self.mappings = store;
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

    pub fn build(self) -> Result<SyncEngine, ConfigError> {
        self.config.validate()?;

        let serializer = CallSerializer::new().with_min_spacing(self.config.min_spacing());
        let core = Arc::new(EngineCore {
            registry: EndpointRegistry::new(self.config.adapter_id.clone()),
            tracker: self.tracker,
            mappings: self.mappings,
            serializer: Arc::new(serializer),
            repositories: CallCache::new(),
            config: self.config,
        });

        let mut queue = EventQueue::builder(self.queue_store)
            .config(core.config.queue.clone())
            .clock(self.clock)
            .observer(Arc::new(DeliveryLog));
        for observer in self.observers {
            queue = queue.observer(observer);
        }
        let queue = queue.build(core.clone())?;

        Ok(SyncEngine { core, queue })
    }
}

/// Accepts upstream domain events and delivers them to registered endpoints.
///
/// `submit` filters and enqueues; delivery happens when the queue is swept,
/// either by [`run_once`](EventQueue::run_once) on [`queue`](SyncEngine::queue)
/// or by a worker from [`spawn_worker`](SyncEngine::spawn_worker).
#[derive(Clone)]
pub struct SyncEngine {
    core: Arc<EngineCore>,
    queue: EventQueue,
}

impl SyncEngine {
    /// Engine that keeps everything in memory until stores are configured.
    pub fn builder(tracker: Arc<dyn IssueTracker>) -> SyncEngineBuilder {
        let store = Arc::new(HashMapStore::new());
        SyncEngineBuilder {
            config: SyncConfig::default(),
            tracker,
            queue_store: store.clone(),
            mappings: store,
            observers: Vec::new(),
            clock: Clock::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.core.config
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.core.registry
    }

    pub fn register_endpoint(&self, record: EndpointRecord) -> Result<(), ConstructionError> {
        let id = record.id.clone();
        if self.core.registry.register(record)?.is_some() {
            debug!(endpoint_id = %id, "endpoint replaced");
        }
        Ok(())
    }

    pub fn endpoint(&self, id: &str) -> Result<SyncEndpoint, SyncError> {
        self.core.endpoint(id)
    }

    /// Queue `event` for delivery.
    ///
    /// Events without a complete target, or targeting another adapter, are
    /// dropped and `Ok(None)` is returned.
    pub async fn submit(&self, event: DomainEvent) -> Result<Option<QueuedEvent>, QueueError> {
        let Some(endpoint_id) = self.accepted_endpoint(&event) else {
            return Ok(None);
        };

        let queued = match event {
            DomainEvent::Annotation { annotation, .. } => {
                let job = AnnotationJob {
                    endpoint_id,
                    annotation,
                };
                self.queue.enqueue(ANNOTATION, &job).await?
            }
            DomainEvent::Reply { reply, .. } => {
                let job = ReplyJob { endpoint_id, reply };
                self.queue.enqueue(REPLY, &job).await?
            }
        };
        Ok(Some(queued))
    }

    fn accepted_endpoint(&self, event: &DomainEvent) -> Option<String> {
        let subject = event.subject_id();
        let event_type = event.event_type();

        let Some(target) = event.target() else {
            debug!(event_type, subject, "dropping event without target");
            return None;
        };
        let Some(endpoint_id) = target.endpoint_id.as_deref().filter(|id| !id.is_empty()) else {
            debug!(event_type, subject, "dropping event without target endpoint");
            return None;
        };
        let Some(adapter_id) = target.adapter_id.as_deref().filter(|id| !id.is_empty()) else {
            debug!(event_type, subject, "dropping event without target adapter");
            return None;
        };
        if adapter_id != self.core.registry.adapter_id() {
            debug!(event_type, subject, adapter_id, "event targets another adapter");
            return None;
        }
        Some(endpoint_id.to_string())
    }

    /// Feed events from a bounded channel into [`submit`](Self::submit).
    ///
    /// The task ends once every sender is dropped and yields the number of
    /// events it queued.
    pub fn spawn_intake(&self, capacity: usize) -> (mpsc::Sender<DomainEvent>, JoinHandle<usize>) {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        let engine = self.clone();

        let handle = tokio::spawn(async move {
            let mut queued = 0;
            while let Some(event) = rx.recv().await {
                match engine.submit(event).await {
                    Ok(Some(_)) => queued += 1,
                    Ok(None) => {}
                    Err(err) => error!(error = %err, "failed to queue upstream event"),
                }
            }
            debug!(queued, "intake closed");
            queued
        });

        (tx, handle)
    }

    pub fn spawn_worker(&self) -> QueueWorker {
        QueueWorker::spawn(self.queue.clone())
    }

    /// Repositories reachable through the given installations, as endpoint
    /// identities. Listings are cached per installation.
    pub async fn accessible_endpoints(
        &self,
        installation_ids: &[String],
    ) -> Result<Vec<EndpointIdentity>, SyncError> {
        let ttl = self.core.config.repositories_ttl();
        let listings = try_join_all(installation_ids.iter().map(|installation_id| {
            let tracker = Arc::clone(&self.core.tracker);
            let id = installation_id.clone();
            self.core.repositories.cached(installation_id.clone(), ttl, move || async move {
                tracker.installation_repositories(&id).await
            })
        }))
        .await?;

        let identities = listings
            .iter()
            .flatten()
            .map(EndpointIdentity::from_repository)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(identities)
    }
}
