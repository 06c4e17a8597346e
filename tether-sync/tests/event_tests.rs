mod common;

use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use tether_sync::{
    EventHub, EventKind, Query, QueryResult, RecordIdentity, SourceEvent, SyncError, SyncResult,
    Transform,
};

fn recorder(hub: &EventHub, kind: EventKind, tag: &'static str, seen: &Arc<Mutex<Vec<&'static str>>>) {
    let seen = Arc::clone(seen);
    let listener = move |_: &SourceEvent| -> SyncResult<()> {
        seen.lock().unwrap().push(tag);
        Ok(())
    };
    hub.on(kind, Arc::new(listener));
}

fn failing(hub: &EventHub, kind: EventKind, message: &'static str) {
    let listener = move |_: &SourceEvent| -> SyncResult<()> { Err(SyncError::Source(message.into())) };
    hub.on(kind, Arc::new(listener));
}

// ── EventKind ────────────────────────────────────────────────────

#[test]
fn kind_names() {
    assert_eq!(EventKind::BeforeQuery.name(), "beforeQuery");
    assert_eq!(EventKind::UpdateFail.name(), "updateFail");
    assert_eq!(EventKind::Transform.to_string(), "transform");
    assert_eq!(EventKind::ALL.len(), 16);
    assert_eq!(serde_json::to_string(&EventKind::BeforePush).unwrap(), "\"beforePush\"");
}

#[test]
fn kind_payloads() {
    assert!(EventKind::BeforeQuery.carries_query());
    assert!(EventKind::PullFail.carries_query());
    assert!(EventKind::BeforeUpdate.carries_transform());
    assert!(EventKind::Transform.carries_transform());
    assert!(!EventKind::BeforePush.carries_query());
    assert!(EventKind::Sync.is_sync());
    assert!(!EventKind::Update.is_sync());
}

#[test]
fn event_accessors() {
    let query = Query::find_records("article");
    let transform = Transform::add_record(common::article("a1", "Hi"));

    let before = SourceEvent::BeforeQuery(query.clone());
    assert_eq!(before.kind(), EventKind::BeforeQuery);
    assert_eq!(before.query(), Some(&query));
    assert!(before.transform().is_none());

    let fail = SourceEvent::PushFail(transform.clone(), "offline".into());
    assert_eq!(fail.kind(), EventKind::PushFail);
    assert_eq!(fail.transform().map(Transform::id), Some(transform.id()));
    assert!(fail.summary().contains("offline"));

    let answered = SourceEvent::Query(query, QueryResult::Collection(Vec::new()));
    assert!(answered.summary().ends_with("0 record(s)"));

    let find = SourceEvent::BeforeQuery(Query::find_record(RecordIdentity::new("article", "a1")));
    assert!(find.summary().contains("findRecord"));
}

// ── EventHub ─────────────────────────────────────────────────────

#[tokio::test]
async fn listeners_run_in_registration_order() {
    let hub = EventHub::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    recorder(&hub, EventKind::BeforeQuery, "first", &seen);
    recorder(&hub, EventKind::BeforeQuery, "second", &seen);
    recorder(&hub, EventKind::Query, "other", &seen);

    hub.fulfill(&SourceEvent::BeforeQuery(Query::find_records("article")))
        .await
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    assert_eq!(hub.listener_count(EventKind::BeforeQuery), 2);
}

#[tokio::test]
async fn fulfill_stops_at_first_error() {
    let hub = EventHub::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    recorder(&hub, EventKind::BeforeUpdate, "first", &seen);
    failing(&hub, EventKind::BeforeUpdate, "nope");
    recorder(&hub, EventKind::BeforeUpdate, "never", &seen);

    let event = SourceEvent::BeforeUpdate(Transform::add_record(common::article("a1", "Hi")));
    let err = hub.fulfill(&event).await.unwrap_err();
    assert!(err.to_string().contains("nope"));
    assert_eq!(*seen.lock().unwrap(), vec!["first"]);
}

#[tokio::test]
async fn settle_runs_everyone_and_returns_first_error() {
    let hub = EventHub::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    failing(&hub, EventKind::Transform, "first failure");
    recorder(&hub, EventKind::Transform, "after", &seen);
    failing(&hub, EventKind::Transform, "second failure");

    let event = SourceEvent::Transform(Transform::add_record(common::article("a1", "Hi")));
    let err = hub.settle(&event).await.unwrap_err();
    assert!(err.to_string().contains("first failure"));
    assert_eq!(*seen.lock().unwrap(), vec!["after"]);
}

#[tokio::test]
async fn off_removes_listener() {
    let hub = EventHub::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_inner = Arc::clone(&seen);
    let listener = move |_: &SourceEvent| -> SyncResult<()> {
        seen_inner.lock().unwrap().push("called");
        Ok(())
    };
    let id = hub.on(EventKind::Transform, Arc::new(listener));

    assert!(hub.off(id));
    assert!(!hub.off(id));
    assert_eq!(hub.listener_count(EventKind::Transform), 0);

    let event = SourceEvent::Transform(Transform::add_record(common::article("a1", "Hi")));
    hub.settle(&event).await.unwrap();
    assert!(seen.lock().unwrap().is_empty());
}
