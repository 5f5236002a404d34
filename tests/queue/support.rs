//! Scripted event handler for queue tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docloop_github::{
    ChannelObserver, CheckOff, EventHandler, EventQueue, HashMapStore, QueueConfig, QueueNotice,
    QueuedEvent, Settlement,
};
use tokio::sync::mpsc::UnboundedReceiver;

/// What the handler does with one attempt.
#[derive(Debug, Clone)]
pub enum Step {
    Done,
    Retry(&'static str),
    Panic,
    /// Drop the check-off without using it.
    Drop,
    /// Keep the check-off for the test to use later.
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub event_id: String,
    pub attempt: u32,
    pub at: u64,
}

pub struct ScriptedHandler {
    types: Vec<String>,
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
    held: Mutex<Vec<CheckOff>>,
    settlements: Mutex<Vec<Settlement>>,
    clock: Mutex<Option<docloop_github::Clock>>,
}

impl ScriptedHandler {
    /// Runs `steps` in order, then completes every further attempt.
    pub fn new(types: &[&str], steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            types: types.iter().map(|t| t.to_string()).collect(),
            steps: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            settlements: Mutex::new(Vec::new()),
            clock: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.settlements.lock().unwrap().clone()
    }

    pub fn take_held(&self) -> Option<CheckOff> {
        self.held.lock().unwrap().pop()
    }
}

#[async_trait]
impl EventHandler for ScriptedHandler {
    fn event_types(&self) -> Vec<String> {
        self.types.clone()
    }

    async fn handle(&self, event: QueuedEvent, check_off: CheckOff) {
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Done);
        let at = self
            .clock
            .lock()
            .unwrap()
            .map(|clock| clock.now_millis())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(Call {
            event_id: event.id.clone(),
            attempt: check_off.attempt(),
            at,
        });

        match step {
            Step::Done => {
                let settlement = check_off.done().await.unwrap();
                self.settlements.lock().unwrap().push(settlement);
            }
            Step::Retry(reason) => {
                let settlement = check_off.retry(reason).await.unwrap();
                self.settlements.lock().unwrap().push(settlement);
            }
            Step::Panic => panic!("scripted handler panic"),
            Step::Drop => drop(check_off),
            Step::Hold => self.held.lock().unwrap().push(check_off),
        }
    }
}

pub struct Harness {
    pub queue: EventQueue,
    pub store: HashMapStore,
    pub handler: Arc<ScriptedHandler>,
    pub notices: UnboundedReceiver<QueueNotice>,
}

impl Harness {
    pub fn new(config: QueueConfig, steps: impl IntoIterator<Item = Step>) -> Self {
        let store = HashMapStore::new();
        let handler = ScriptedHandler::new(&["job"], steps);
        let (observer, notices) = ChannelObserver::new();

        let queue = EventQueue::builder(Arc::new(store.clone()))
            .config(config)
            .observer(Arc::new(observer))
            .build(handler.clone())
            .unwrap();
        *handler.clock.lock().unwrap() = Some(*queue.clock());

        Self {
            queue,
            store,
            handler,
            notices,
        }
    }

    /// Names of all notices observed so far.
    pub fn drain_notices(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            names.push(notice.name());
        }
        names
    }
}

/// Deterministic schedule: no jitter.
pub fn config() -> QueueConfig {
    QueueConfig::default().with_spread(0)
}
