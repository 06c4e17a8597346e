mod common;

use common::{ScriptedSource, Step, article};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tether_sync::{Query, QueueStatus, Request, Response, SourceHandle, SyncError, Transform};

fn handle() -> (Arc<ScriptedSource>, Arc<SourceHandle>) {
    let source = Arc::new(ScriptedSource::new());
    let handle = SourceHandle::new("scripted", source.clone());
    (source, handle)
}

/// Lets the queue worker pick up its next entry.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ── Ordering ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn requests_run_in_arrival_order_regardless_of_latency() {
    let (source, handle) = handle();
    source.then_delay(Duration::from_millis(300));
    source.then_delay(Duration::from_millis(10));
    source.then_delay(Duration::from_millis(100));

    let first = handle.update(Transform::add_record(article("a", "A")));
    let second = handle.update(Transform::add_record(article("b", "B")));
    let third = handle.query(Query::find_records("article"));
    let (first, second, third) = tokio::join!(first, second, third);
    first.unwrap();
    second.unwrap();
    third.unwrap();

    assert_eq!(
        source.calls(),
        vec![
            "start update a",
            "end update a",
            "start update b",
            "end update b",
            "start query article",
            "end query article",
        ]
    );
    assert_eq!(source.max_concurrency(), 1);
}

#[tokio::test(start_paused = true)]
async fn order_is_fixed_when_requests_are_issued_not_awaited() {
    let (source, handle) = handle();
    source.then_delay(Duration::from_millis(50));

    let slow = handle.update(Transform::add_record(article("a", "A")));
    let fast = handle.update(Transform::add_record(article("b", "B")));
    // Await in reverse
    fast.await.unwrap();
    slow.await.unwrap();

    assert_eq!(source.calls()[0], "start update a");
    assert_eq!(source.calls()[2], "start update b");
}

#[tokio::test]
async fn separate_sync_queue() {
    let (source, handle) = handle();
    handle.sync(Transform::add_record(article("s", "S"))).await.unwrap();
    handle.update(Transform::add_record(article("u", "U"))).await.unwrap();

    assert_eq!(handle.sync_queue().name(), "scripted:syncs");
    assert_eq!(handle.request_queue().name(), "scripted:requests");
    assert_eq!(source.count("start sync"), 1);
    assert_eq!(source.count("start update"), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_update_waits_its_turn() {
    let (source, handle) = handle();
    let first = Transform::add_record(article("a", "A"));
    handle.update(first.clone()).await.unwrap();

    source.then_delay(Duration::from_millis(100));
    let slow = handle.update(Transform::add_record(article("b", "B")));
    let again = handle.update(first.clone());

    assert_eq!(again.await.unwrap(), first);
    assert!(source.calls().contains(&"end update b".to_string()));
    assert_eq!(source.count("start update a"), 1);
    slow.await.unwrap();
}

// ── Stalls ───────────────────────────────────────────────────────

#[tokio::test]
async fn halting_error_stalls_the_queue() {
    let (source, handle) = handle();
    source.then_fail(SyncError::Source("disk on fire".into()));

    let err = handle.query(Query::find_records("article")).await.unwrap_err();
    assert!(matches!(err, SyncError::Source(_)));
    assert!(handle.request_queue().is_stalled());
    assert!(matches!(
        handle.request_queue().status(),
        QueueStatus::Stalled { ref error, .. } if error.contains("disk on fire")
    ));
    assert_eq!(handle.request_queue().len(), 1);

    let err = handle.query(Query::find_records("article")).await.unwrap_err();
    assert!(matches!(err, SyncError::QueueStalled { .. }));
    assert_eq!(source.count("start query"), 1);
}

#[tokio::test]
async fn deterministic_error_does_not_stall() {
    let (source, handle) = handle();
    source.then_fail(SyncError::Validation("bad".into()));

    let err = handle.query(Query::find_records("article")).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
    assert!(!handle.request_queue().is_stalled());

    handle.query(Query::find_records("article")).await.unwrap();
    assert_eq!(source.count("start query"), 2);
}

#[tokio::test]
async fn skip_drops_stalled_head_and_resumes() {
    let (source, handle) = handle();
    source.then_fail(SyncError::Network("offline".into()));

    handle.query(Query::find_records("article")).await.unwrap_err();
    assert!(handle.request_queue().skip());
    assert_eq!(handle.request_queue().status(), QueueStatus::Idle);
    assert!(handle.request_queue().is_empty());

    handle.query(Query::find_records("profile")).await.unwrap();
    assert_eq!(
        source.calls(),
        vec![
            "start query article",
            "end query article",
            "start query profile",
            "end query profile",
        ]
    );
}

#[tokio::test]
async fn retry_reexecutes_stalled_head() {
    let (source, handle) = handle();
    source.then_fail(SyncError::Timeout);

    handle.query(Query::find_records("article")).await.unwrap_err();
    let retried = handle.request_queue().retry().unwrap().await.unwrap();
    assert!(matches!(retried, Response::Query(_)));
    assert_eq!(handle.request_queue().status(), QueueStatus::Idle);
    assert!(handle.request_queue().is_empty());
    assert_eq!(source.count("start query article"), 2);
}

#[tokio::test]
async fn retry_without_stall_is_none() {
    let (_, handle) = handle();
    assert!(handle.request_queue().retry().is_none());
}

#[tokio::test]
async fn skip_on_empty_queue_is_false() {
    let (_, handle) = handle();
    assert!(!handle.request_queue().skip());
}

#[tokio::test(start_paused = true)]
async fn skip_while_processing_discards_instead_of_stalling() {
    let (source, handle) = handle();
    source.then(Step {
        delay: Duration::from_millis(100),
        error: Some(SyncError::Source("boom".into())),
    });

    let pending = handle.query(Query::find_records("article"));
    settle().await;
    assert!(matches!(handle.request_queue().status(), QueueStatus::Processing(_)));
    assert!(handle.request_queue().skip());

    let err = pending.await.unwrap_err();
    assert!(matches!(err, SyncError::Source(_)));
    assert!(!handle.request_queue().is_stalled());
    handle.query(Query::find_records("article")).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn clear_discards_waiting_entries() {
    let (source, handle) = handle();
    source.then_delay(Duration::from_millis(100));

    let running = handle.query(Query::find_records("article"));
    settle().await;
    let waiting_a = handle.query(Query::find_records("profile"));
    let waiting_b = handle.update(Transform::add_record(article("a", "A")));
    assert_eq!(handle.request_queue().len(), 3);

    assert_eq!(handle.request_queue().clear(), 2);
    assert!(matches!(waiting_a.await.unwrap_err(), SyncError::Skipped { .. }));
    assert!(matches!(waiting_b.await.unwrap_err(), SyncError::Skipped { .. }));
    running.await.unwrap();

    assert_eq!(source.calls(), vec!["start query article", "end query article"]);
}

#[tokio::test]
async fn clear_unstalls() {
    let (source, handle) = handle();
    source.then_fail(SyncError::Source("boom".into()));
    handle.query(Query::find_records("article")).await.unwrap_err();

    assert_eq!(handle.request_queue().clear(), 1);
    assert!(!handle.request_queue().is_stalled());
    handle.query(Query::find_records("article")).await.unwrap();
}

#[tokio::test]
async fn failed_sync_does_not_stall_the_sync_queue() {
    let (source, handle) = handle();
    source.then_fail(SyncError::Network("offline".into()));

    let err = handle
        .sync(Transform::add_record(article("a", "A")))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
    assert!(!handle.sync_queue().is_stalled());
    assert!(handle.sync_queue().is_empty());

    let second = Transform::add_record(article("b", "B"));
    handle.sync(second.clone()).await.unwrap();
    assert_eq!(source.count("start sync"), 2);
    assert_eq!(handle.log().entries(), vec![second.id()]);
}

#[tokio::test]
async fn issuer_releases_only_its_own_stalled_entry() {
    let (source, handle) = handle();
    source.then_fail(SyncError::Timeout);
    let transform = Transform::add_record(article("a", "A"));
    handle.update(transform.clone()).await.unwrap_err();

    let queue = handle.request_queue();
    assert!(!queue.skip_stalled_if(|r| matches!(r, Request::Query(_))));
    assert!(queue.is_stalled());
    assert!(queue.skip_stalled_if(
        |r| matches!(r, Request::Update(t) if t.id() == transform.id())
    ));
    assert_eq!(queue.status(), QueueStatus::Idle);
    assert!(!queue.skip_stalled_if(|_| true));

    handle.update(Transform::add_record(article("b", "B"))).await.unwrap();
}
