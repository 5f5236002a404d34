//! Background dispatch loop for an [`EventQueue`].

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{DispatchReport, EventQueue};

/// Statistics from the queue worker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub sweeps: usize,
    pub dispatched: usize,
    pub failed: usize,
    pub recovered: usize,
    pub errors: usize,
}

impl WorkerStats {
    fn absorb(&mut self, report: DispatchReport) {
        self.dispatched += report.dispatched;
        self.failed += report.failed;
        self.recovered += report.recovered;
    }
}

/// A tokio task sweeping the queue every `process_interval`, and right away
/// whenever an event is enqueued.
///
/// ## Example
///
/// ```ignore
/// let worker = QueueWorker::spawn(queue.clone());
///
/// // ... enqueue events ...
///
/// let stats = worker.stop().await;
/// println!("dispatched {} attempts", stats.dispatched);
/// ```
pub struct QueueWorker {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<WorkerStats>>,
}

impl QueueWorker {
    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(queue: EventQueue) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut stats = WorkerStats::default();
            let mut interval = tokio::time::interval(queue.config().process_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let shared = queue.shared().clone();

            loop {
                tokio::select! {
                    // Only `true` is ever sent; a closed channel also means stop.
                    _ = stop_rx.changed() => break,
                    _ = interval.tick() => {}
                    _ = shared.wake.notified() => {}
                }

                stats.sweeps += 1;
                match queue.process_due().await {
                    Ok(report) => stats.absorb(report),
                    Err(err) => {
                        // Store trouble is retried on the next sweep.
                        stats.errors += 1;
                        tracing::error!(error = %err, "queue sweep failed");
                    }
                }
            }

            tracing::debug!(sweeps = stats.sweeps, "queue worker stopped");
            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the worker to stop and wait for it to finish.
    /// Handlers already running keep running; see [`EventQueue::wait_idle`].
    pub async fn stop(mut self) -> WorkerStats {
        let _ = self.stop_tx.send(true);
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => WorkerStats::default(),
        }
    }
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}
