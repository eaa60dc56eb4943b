//! Ordering guarantees.
//!
//! Properties covered:
//! - N enqueues followed by a clean drain produce exactly N replays in enqueue order
//! - Replays carry method, endpoint and payload exactly as enqueued
//! - A deferred item holds back later items for the same resource only
//! - Connectivity dropping mid-cycle stops scheduling; leftovers drain next cycle, still ascending
//! - Offline sync requests do nothing

use super::harness::{Harness, Reply};
use crate::DrainOutcome;
use serde_json::json;
use std::time::Duration;
use sync_queue::{HttpMethod, NewMutation};

#[tokio::test]
async fn clean_drain_replays_every_item_once_in_enqueue_order() {
    let h = Harness::new(false).await;
    let mut ids = Vec::new();
    for i in 0..6 {
        let target = format!("p{}", i % 3);
        ids.push(h.rename(&target, &format!("name {i}")).await.id);
    }

    h.monitor.report(true);
    let outcome = h.manager.sync().await;

    let report = outcome.report().expect("cycle ran");
    assert_eq!(report.attempted, 6);
    assert_eq!(report.succeeded, 6);
    assert_eq!(h.api.call_ids(), ids);
    assert!(h.manager.get_pending_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn replay_is_verbatim() {
    let h = Harness::new(true).await;
    h.manager
        .enqueue(
            NewMutation::create("notes", "/api/v2/notes?draft=1", json!({"body": "hi", "tags": [1, 2]})),
            None,
        )
        .await
        .unwrap();
    h.manager
        .enqueue(NewMutation::delete("notes", "n7", "/api/v2/notes/n7"), None)
        .await
        .unwrap();
    h.manager
        .enqueue(
            NewMutation::update("notes", "n8", "/api/v2/notes/n8", json!({"body": "x"}))
                .with_method(HttpMethod::Put),
            None,
        )
        .await
        .unwrap();

    h.manager.sync().await;

    let calls = h.api.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].method, HttpMethod::Post);
    assert_eq!(calls[0].endpoint, "/api/v2/notes?draft=1");
    assert_eq!(calls[0].payload, json!({"body": "hi", "tags": [1, 2]}));
    assert_eq!(calls[1].method, HttpMethod::Delete);
    assert_eq!(calls[1].endpoint, "/api/v2/notes/n7");
    assert_eq!(calls[2].method, HttpMethod::Put);
    assert_eq!(calls[2].payload, json!({"body": "x"}));
}

#[tokio::test]
async fn retrying_item_blocks_only_its_own_resource() {
    let h = Harness::new(false).await;
    let a1 = h.rename("a", "a1").await;
    let b1 = h.rename("b", "b1").await;
    let a2 = h.rename("a", "a2").await;
    let b2 = h.rename("b", "b2").await;

    h.api.push_many([Reply::status(503), Reply::ok(), Reply::ok()]);
    h.monitor.report(true);
    let report = h.manager.sync().await.report().cloned().unwrap();

    assert_eq!(report.retried, 1);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.deferred, 1);
    assert_eq!(h.api.call_ids(), vec![a1.id, b1.id, b2.id]);

    let pending: Vec<i64> = h
        .manager
        .get_pending_items()
        .await
        .unwrap()
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(pending, vec![a1.id, a2.id]);

    // Once the backoff passes, a1 goes first and a2 follows.
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.manager.sync().await;
    assert_eq!(h.api.call_ids(), vec![a1.id, b1.id, b2.id, a1.id, a2.id]);
    assert!(h.manager.get_pending_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn creates_without_target_do_not_block_each_other() {
    let h = Harness::new(true).await;
    let first = h
        .manager
        .enqueue(NewMutation::create("projects", "/projects", json!({"name": "a"})), None)
        .await
        .unwrap();
    let second = h
        .manager
        .enqueue(NewMutation::create("projects", "/projects", json!({"name": "b"})), None)
        .await
        .unwrap();

    h.api.push_many([Reply::network(), Reply::ok()]);
    let report = h.manager.sync().await.report().cloned().unwrap();

    assert_eq!(report.retried, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(h.api.call_ids(), vec![first.id, second.id]);
}

#[tokio::test]
async fn going_offline_mid_cycle_stops_scheduling() {
    let h = Harness::new(false).await;
    let a = h.rename("a", "1").await;
    let b = h.rename("b", "1").await;
    let c = h.rename("c", "1").await;

    h.api.go_offline_after(1, h.monitor.clone());
    h.monitor.report(true);
    let report = h.manager.sync().await.report().cloned().unwrap();

    assert!(report.stopped_offline);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(h.api.call_ids(), vec![a.id]);

    // Untouched leftovers keep their state.
    let pending = h.manager.get_pending_items().await.unwrap();
    assert_eq!(pending.iter().map(|m| m.id).collect::<Vec<_>>(), vec![b.id, c.id]);
    assert!(pending.iter().all(|m| m.retry_count == 0 && m.last_attempt_at.is_none()));

    h.monitor.report(true);
    h.manager.sync().await;
    assert_eq!(h.api.call_ids(), vec![a.id, b.id, c.id]);
}

#[tokio::test]
async fn sync_while_offline_is_a_no_op() {
    let h = Harness::new(false).await;
    h.rename("a", "1").await;

    assert_eq!(h.manager.sync().await, DrainOutcome::Offline);
    assert!(h.api.calls().is_empty());
    assert_eq!(h.manager.status().pending_count, 1);
    assert!(h.manager.status().last_sync_time.is_none());
}
