mod support;

use std::time::Duration;

use docloop_github::{QueueError, QueueWorker, QueuedEventStatus, Settlement};
use tokio::time::advance;

use support::{config, Harness, Step};

// =============================================================================
// Backoff schedule
// =============================================================================

#[tokio::test(start_paused = true)]
async fn retries_follow_the_delay_schedule_and_reuse_its_last_entry() {
    let mut h = Harness::new(
        config().with_max_attempts(5),
        [Step::Retry("e1"), Step::Retry("e2"), Step::Retry("e3"), Step::Retry("e4"), Step::Retry("e5")],
    );
    let queued = h.queue.enqueue("job", &"payload").await.unwrap();

    for expected_delay in [0u64, 1_000, 5_000, 5_000] {
        let now = h.queue.clock().now_millis();
        let report = h.queue.run_once().await.unwrap();
        assert_eq!(report.dispatched, 1);

        let event = h.queue.get(&queued.id).await.unwrap().unwrap();
        assert_eq!(event.status, QueuedEventStatus::Pending);
        assert_eq!(event.next_attempt_at, now + expected_delay);

        if expected_delay > 0 {
            advance(Duration::from_millis(expected_delay - 1)).await;
            let early = h.queue.run_once().await.unwrap();
            assert_eq!(early.dispatched, 0, "dispatched before its delay elapsed");
            advance(Duration::from_millis(1)).await;
        }
    }

    h.queue.run_once().await.unwrap();
    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.status, QueuedEventStatus::Failed);
    assert_eq!(event.attempts, 5);
    assert_eq!(event.last_error.as_deref(), Some("e5"));

    let attempts: Vec<u32> = h.handler.calls().iter().map(|c| c.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
    assert_eq!(h.drain_notices().last().map(String::as_str), Some("job-fail"));
}

#[tokio::test(start_paused = true)]
async fn no_attempt_after_max_attempts() {
    let h = Harness::new(
        config().with_delay(vec![0]),
        [Step::Retry("down"), Step::Retry("down"), Step::Retry("down")],
    );
    let queued = h.queue.enqueue("job", &1u32).await.unwrap();

    for _ in 0..3 {
        h.queue.run_once().await.unwrap();
    }
    let settlements = h.handler.settlements();
    assert_eq!(settlements.last(), Some(&Settlement::Failed));

    advance(Duration::from_secs(3600)).await;
    let report = h.queue.run_once().await.unwrap();
    assert_eq!(report.dispatched, 0);
    assert_eq!(h.handler.calls().len(), 3);

    let failed = h.queue.events_by_status(QueuedEventStatus::Failed).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, queued.id);
}

#[tokio::test(start_paused = true)]
async fn min_delay_raises_short_delays() {
    let h = Harness::new(config().with_min_delay(500), [Step::Retry("slow")]);
    let queued = h.queue.enqueue("job", &"payload").await.unwrap();

    let now = h.queue.clock().now_millis();
    h.queue.run_once().await.unwrap();

    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.next_attempt_at, now + 500);
}

// =============================================================================
// Check-off
// =============================================================================

#[tokio::test(start_paused = true)]
async fn done_emits_attempt_then_done() {
    let mut h = Harness::new(config(), []);
    let queued = h.queue.enqueue("job", &"payload").await.unwrap();

    h.queue.run_once().await.unwrap();

    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.status, QueuedEventStatus::Done);
    assert_eq!(event.attempts, 1);
    assert_eq!(h.drain_notices(), vec!["job-attempt", "job-done"]);
}

#[tokio::test(start_paused = true)]
async fn terminal_records_can_be_discarded() {
    let h = Harness::new(config().with_retain_terminal(false), []);
    let queued = h.queue.enqueue("job", &"payload").await.unwrap();

    h.queue.run_once().await.unwrap();

    assert!(h.queue.get(&queued.id).await.unwrap().is_none());
    assert_eq!(h.store.event_count().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn held_check_off_is_stale_after_lease_expiry() {
    let h = Harness::new(
        config().with_lease(Duration::from_secs(1)),
        [Step::Hold],
    );
    let queued = h.queue.enqueue("job", &"payload").await.unwrap();

    h.queue.run_once().await.unwrap();
    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.status, QueuedEventStatus::InFlight);

    advance(Duration::from_millis(1_001)).await;
    let report = h.queue.process_due().await.unwrap();
    assert_eq!(report.recovered, 1);
    assert_eq!(report.dispatched, 0);

    let late = h.handler.take_held().unwrap();
    assert_eq!(late.done().await.unwrap(), Settlement::Stale);
    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.status, QueuedEventStatus::Pending);

    h.queue.run_once().await.unwrap();
    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.status, QueuedEventStatus::Done);
    assert_eq!(event.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn renewed_lease_keeps_a_held_attempt_in_flight() {
    let h = Harness::new(
        config().with_lease(Duration::from_secs(1)),
        [Step::Hold],
    );
    let queued = h.queue.enqueue("job", &"payload").await.unwrap();
    h.queue.run_once().await.unwrap();
    let held = h.handler.take_held().unwrap();
    assert_eq!(held.lease(), Duration::from_secs(1));

    advance(Duration::from_millis(800)).await;
    assert!(held.renew().await.unwrap());

    advance(Duration::from_millis(800)).await;
    let report = h.queue.process_due().await.unwrap();
    assert_eq!(report.recovered, 0);
    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.status, QueuedEventStatus::InFlight);
    assert_eq!(event.attempts, 1);

    assert_eq!(held.done().await.unwrap(), Settlement::Done);
}

#[tokio::test(start_paused = true)]
async fn renewing_a_swept_attempt_does_nothing() {
    let h = Harness::new(
        config().with_lease(Duration::from_secs(1)),
        [Step::Hold],
    );
    let queued = h.queue.enqueue("job", &"payload").await.unwrap();
    h.queue.run_once().await.unwrap();
    let held = h.handler.take_held().unwrap();

    advance(Duration::from_millis(1_001)).await;
    h.queue.process_due().await.unwrap();

    assert!(!held.renew().await.unwrap());
    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.status, QueuedEventStatus::Pending);
    assert_eq!(event.leased_until, None);
}

// =============================================================================
// Unacknowledged attempts
// =============================================================================

#[tokio::test(start_paused = true)]
async fn panicking_handler_is_retried() {
    let h = Harness::new(config(), [Step::Panic]);
    let queued = h.queue.enqueue("job", &"payload").await.unwrap();

    let report = h.queue.run_once().await.unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.recovered, 1);

    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.status, QueuedEventStatus::Pending);
    assert!(event.last_error.is_some());

    h.queue.run_once().await.unwrap();
    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.status, QueuedEventStatus::Done);
    assert_eq!(event.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_check_off_is_retried() {
    let h = Harness::new(config(), [Step::Drop]);
    let queued = h.queue.enqueue("job", &"payload").await.unwrap();

    h.queue.run_once().await.unwrap();
    h.queue.run_once().await.unwrap();

    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.status, QueuedEventStatus::Done);
    let attempts: Vec<u32> = h.handler.calls().iter().map(|c| c.attempt).collect();
    assert_eq!(attempts, vec![1, 2]);
}

// =============================================================================
// Enqueue
// =============================================================================

#[tokio::test]
async fn unknown_event_type_is_rejected() {
    let h = Harness::new(config(), []);
    let err = h.queue.enqueue("other", &"payload").await.unwrap_err();
    assert!(matches!(err, QueueError::UnsupportedEventType(t) if t == "other"));
    assert_eq!(h.store.event_count().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn one_failing_event_does_not_hold_back_another() {
    let h = Harness::new(config(), [Step::Retry("first attempt fails")]);
    h.queue.enqueue("job", &1u32).await.unwrap();
    h.queue.enqueue("job", &2u32).await.unwrap();

    let report = h.queue.run_once().await.unwrap();
    assert_eq!(report.dispatched, 2);

    let done = h.queue.events_by_status(QueuedEventStatus::Done).await.unwrap();
    let pending = h.queue.events_by_status(QueuedEventStatus::Pending).await.unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(pending.len(), 1);

    h.queue.run_once().await.unwrap();
    let done = h.queue.events_by_status(QueuedEventStatus::Done).await.unwrap();
    assert_eq!(done.len(), 2);
    assert!(done.iter().any(|event| event.attempts == 2));
}

// =============================================================================
// Worker
// =============================================================================

#[tokio::test(start_paused = true)]
async fn worker_dispatches_on_enqueue_without_waiting_for_a_tick() {
    let mut h = Harness::new(config(), []);
    let worker = QueueWorker::spawn(h.queue.clone());

    // Let the first (immediate) interval tick pass.
    tokio::time::sleep(Duration::from_secs(1)).await;

    h.queue.enqueue("job", &"payload").await.unwrap();

    let mut seen = Vec::new();
    while seen.last().map(String::as_str) != Some("job-done") {
        let notice = tokio::time::timeout(Duration::from_secs(1), h.notices.recv())
            .await
            .expect("no dispatch within a second of enqueue")
            .unwrap();
        seen.push(notice.name());
    }

    let stats = worker.stop().await;
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.errors, 0);
}

#[tokio::test(start_paused = true)]
async fn worker_picks_up_retries_on_its_interval() {
    let h = Harness::new(
        config()
            .with_delay(vec![2_000])
            .with_process_interval(Duration::from_millis(500)),
        [Step::Retry("later")],
    );
    let worker = QueueWorker::spawn(h.queue.clone());
    let queued = h.queue.enqueue("job", &"payload").await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    h.queue.wait_idle().await.unwrap();

    let event = h.queue.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(event.status, QueuedEventStatus::Done);

    let calls = h.handler.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].at - calls[0].at >= 2_000);

    let stats = worker.stop().await;
    assert!(stats.sweeps >= 5);
}
