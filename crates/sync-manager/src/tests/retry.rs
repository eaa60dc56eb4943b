//! Retry, backoff and failure handling.
//!
//! Properties covered:
//! - An item failing every retryable attempt reaches max_retries, leaves automatic
//!   draining and shows up in get_failed_items()
//! - A client failure on attempt 1 jumps to max_retries without waiting out backoff
//! - A not-yet-due item is not replayed; the retry timer replays it once due
//! - Scenario: {A, B, C} queued offline; A and B succeed, C fails retryably three times
//! - retry_failed() resets failed items and drains them
//! - A cycle that makes no progress broadcasts a NoProgress fault
//!
//! Tests that wait for backoff to elapse run on a paused clock, so the full
//! production schedule passes instantly and in order.

use super::harness::{Harness, Reply};
use crate::{compute_backoff, EngineFault, SyncEvent, SyncSettings};
use remote_api_client::StatusCategory;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn retryable_failures_exhaust_to_failed() {
    let h = Harness::with_settings(true, SyncSettings::default()).await;
    let item = h.rename("p1", "x").await;
    h.api.push_many([Reply::status(500), Reply::network(), Reply::status(503)]);

    for expected in 1..=3u32 {
        let report = h.manager.sync().await.report().cloned().unwrap();
        assert_eq!(report.retried, 1);
        let current = h.manager.queue().get(item.id).await.unwrap().unwrap();
        assert_eq!(current.retry_count, expected);
        assert_eq!(h.api.calls().len(), expected as usize);

        // Wait out the 2s, 4s, 8s schedule.
        tokio::time::sleep(compute_backoff(expected, h.manager.settings()).to_std().unwrap()).await;
    }

    let current = h.manager.queue().get(item.id).await.unwrap().unwrap();
    assert_eq!(current.retry_count, 3);
    assert!(current.next_attempt_at.is_none());
    assert!(current.last_error.as_deref().unwrap().contains("503"));

    // Excluded from automatic draining.
    let report = h.manager.sync().await.report().cloned().unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.attempted, 0);
    assert_eq!(h.api.calls().len(), 3);

    let failed = h.manager.get_failed_items().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, item.id);
    assert_eq!(h.manager.status().failed_count, 1);
    assert_eq!(h.manager.status().pending_count, 0);
}

#[tokio::test]
async fn client_failure_fails_fast() {
    let h = Harness::new(true).await;
    let item = h.rename("p1", "").await;
    h.api.push(Reply::status(422));

    let report = h.manager.sync().await.report().cloned().unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.retried, 0);
    let current = h.manager.queue().get(item.id).await.unwrap().unwrap();
    assert_eq!(current.retry_count, 3);
    assert!(current.next_attempt_at.is_none());
    assert_eq!(h.manager.get_failed_items().await.unwrap().len(), 1);
    assert_eq!(h.api.calls().len(), 1);
}

#[tokio::test]
async fn terminal_failure_does_not_block_later_items_on_same_resource() {
    let h = Harness::new(true).await;
    let first = h.rename("p1", "a").await;
    let second = h.rename("p1", "b").await;
    h.api.push_many([Reply::status(400), Reply::ok()]);

    let report = h.manager.sync().await.report().cloned().unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(h.api.call_ids(), vec![first.id, second.id]);
}

#[tokio::test]
async fn timeout_and_rate_limit_are_retryable() {
    assert!(remote_api_client::RemoteFailure::from_status(408, "").retryable);
    let failure = remote_api_client::RemoteFailure::from_status(429, "");
    assert!(failure.retryable);
    assert_eq!(failure.category, StatusCategory::Client);

    let h = Harness::new(true).await;
    h.rename("p1", "a").await;
    h.api.push(Reply::status(429));
    let report = h.manager.sync().await.report().cloned().unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn item_not_due_is_deferred_then_replayed_by_timer() {
    let h = Harness::new(true).await;
    h.manager.start();
    let item = h.rename("p1", "a").await;
    h.api.push(Reply::status(503));

    // The enqueue trigger runs the first attempt; the retry timer the second.
    h.wait_for_calls(2).await;
    h.wait_for_status(|s| s.pending_count == 0 && !s.is_syncing).await;

    assert_eq!(h.api.call_ids(), vec![item.id, item.id]);
    let current = h.manager.queue().get(item.id).await.unwrap().unwrap();
    assert!(current.synced);
    assert_eq!(current.retry_count, 1);
    h.manager.shutdown();
}

#[tokio::test]
async fn immediate_resync_defers_item_in_backoff() {
    let settings = crate::SyncSettings {
        base_backoff: Duration::from_secs(60),
        max_backoff: Duration::from_secs(60),
        ..super::harness::fast_settings()
    };
    let h = Harness::with_settings(true, settings).await;
    h.rename("p1", "a").await;
    h.api.push(Reply::network());

    h.manager.sync().await;
    let report = h.manager.sync().await.report().cloned().unwrap();

    assert_eq!(report.deferred, 1);
    assert_eq!(report.attempted, 0);
    assert_eq!(h.api.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn three_items_two_succeed_last_exhausts_retries() {
    let h = Harness::new(false).await;
    h.manager.start();
    let a = h.rename("x", "a").await;
    let b = h.rename("x", "b").await;
    let c = h.rename("x", "c").await;
    assert!(h.api.calls().is_empty());

    h.api.push_many([
        Reply::ok(),
        Reply::ok(),
        Reply::status(503),
        Reply::status(503),
        Reply::status(503),
    ]);
    h.monitor.report(true);

    h.wait_for_status(|s| s.failed_count == 1 && !s.is_syncing).await;

    assert!(h.manager.queue().get(a.id).await.unwrap().unwrap().synced);
    assert!(h.manager.queue().get(b.id).await.unwrap().unwrap().synced);
    let c = h.manager.queue().get(c.id).await.unwrap().unwrap();
    assert!(!c.synced);
    assert_eq!(c.retry_count, 3);
    assert_eq!(h.api.calls().len(), 5);

    let status = h.manager.status();
    assert_eq!(status.failed_count, 1);
    assert_eq!(status.pending_count, 0);
    assert!(status.last_sync_time.is_some());
    h.manager.shutdown();
}

#[tokio::test]
async fn retry_failed_resets_and_drains() {
    let h = Harness::new(true).await;
    let item = h.rename("p1", "a").await;
    h.api.push(Reply::status(403));
    h.manager.sync().await;
    assert_eq!(h.manager.status().failed_count, 1);

    let outcome = h.manager.retry_failed().await.unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(h.manager.queue().get(item.id).await.unwrap().unwrap().synced);
    assert_eq!(h.manager.status().failed_count, 0);
}

#[tokio::test]
async fn cycle_without_progress_reports_fault() {
    let h = Harness::new(true).await;
    h.rename("p1", "a").await;
    h.rename("p2", "a").await;
    let mut events = h.manager.subscribe_events();
    h.api.push_many([Reply::status(502), Reply::status(400)]);

    h.manager.sync().await;

    let mut faults = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::Fault(fault) = event {
            faults.push(fault);
        }
    }
    assert_eq!(faults, vec![EngineFault::NoProgress { attempted: 2 }]);
}

#[tokio::test]
async fn discard_removes_item() {
    let h = Harness::new(false).await;
    let item = h.rename("p1", "a").await;

    h.manager.discard(item.id).await.unwrap();

    assert!(h.manager.get_pending_items().await.unwrap().is_empty());
    assert_eq!(h.manager.status().pending_count, 0);
    assert!(matches!(
        h.manager.discard(item.id).await,
        Err(crate::SyncError::Queue(sync_queue::QueueError::NotFound(id))) if id == item.id
    ));
}
