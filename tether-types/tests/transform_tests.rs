use proptest::prelude::*;
use tether_types::{Operation, Record, RecordIdentity, Transform, TransformId};

fn record(id: &str) -> Record {
    Record::new("article", id).with_attribute("title", id)
}

// ── Construction ──────────────────────────────────────────────────

#[test]
fn new_transform_has_fresh_id() {
    let a = Transform::new(vec![]);
    let b = Transform::new(vec![]);
    assert_ne!(a.id(), b.id());
}

#[test]
fn with_id_keeps_id() {
    let id = TransformId::new();
    let t = Transform::with_id(id, vec![Operation::AddRecord(record("a1"))]);
    assert_eq!(t.id(), id);
    assert_eq!(t.len(), 1);
    assert!(!t.is_empty());
}

#[test]
fn single_operation_constructors() {
    assert!(matches!(
        Transform::add_record(record("a1")).operations(),
        [Operation::AddRecord(_)]
    ));
    assert!(matches!(
        Transform::update_record(record("a1")).operations(),
        [Operation::UpdateRecord(_)]
    ));
    assert!(matches!(
        Transform::remove_record(RecordIdentity::new("article", "a1")).operations(),
        [Operation::RemoveRecord(_)]
    ));
}

#[test]
fn records_skips_removals() {
    let t = Transform::new(vec![
        Operation::AddRecord(record("a1")),
        Operation::RemoveRecord(RecordIdentity::new("article", "a2")),
        Operation::UpdateRecord(record("a3")),
    ]);
    let ids: Vec<_> = t.records().map(|r| r.id.as_str().to_string()).collect();
    assert_eq!(ids, vec!["a1", "a3"]);
}

// ── Operation ─────────────────────────────────────────────────────

#[test]
fn operation_identity_and_name() {
    let add = Operation::AddRecord(record("a1"));
    let remove = Operation::RemoveRecord(RecordIdentity::new("article", "a2"));
    assert_eq!(add.identity(), RecordIdentity::new("article", "a1"));
    assert_eq!(remove.identity(), RecordIdentity::new("article", "a2"));
    assert_eq!(add.name(), "addRecord");
    assert_eq!(remove.name(), "removeRecord");
    assert!(remove.record().is_none());
}

#[test]
fn operation_serde_tagging() {
    let op = Operation::RemoveRecord(RecordIdentity::new("article", "a1"));
    let json = serde_json::to_value(&op).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"op": "removeRecord", "data": {"type": "article", "id": "a1"}})
    );
}

// ── Properties ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn transform_preserves_operation_order(ids in prop::collection::vec("[a-z]{1,8}", 0..16)) {
        let ops: Vec<Operation> = ids.iter().map(|id| Operation::AddRecord(record(id))).collect();
        let t = Transform::new(ops.clone());
        prop_assert_eq!(t.operations(), ops.as_slice());

        let json = serde_json::to_string(&t).unwrap();
        let parsed: Transform = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, t);
    }
}
