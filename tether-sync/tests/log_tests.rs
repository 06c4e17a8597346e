use pretty_assertions::assert_eq;
use tether_sync::{QueryDedupTracker, TransformId, TransformLog};

// ── TransformLog ─────────────────────────────────────────────────

#[test]
fn append_and_inspect() {
    let log = TransformLog::new();
    assert!(log.is_empty());
    assert_eq!(log.head(), None);

    let (a, b) = (TransformId::new(), TransformId::new());
    log.append(a);
    log.append(b);
    assert_eq!(log.len(), 2);
    assert_eq!(log.entries(), vec![a, b]);
    assert_eq!(log.head(), Some(b));
    assert!(log.contains(a));
    assert!(!log.contains(TransformId::new()));
}

#[test]
fn truncate_drops_entries_before_id() {
    let log = TransformLog::new();
    let ids: Vec<TransformId> = (0..4).map(|_| TransformId::new()).collect();
    for id in &ids {
        log.append(*id);
    }

    assert!(log.truncate(ids[2]));
    assert_eq!(log.entries(), vec![ids[2], ids[3]]);
    assert!(!log.contains(ids[0]));
}

#[test]
fn truncate_to_unknown_id_is_a_no_op() {
    let log = TransformLog::new();
    let id = TransformId::new();
    log.append(id);
    assert!(!log.truncate(TransformId::new()));
    assert_eq!(log.entries(), vec![id]);
}

#[test]
fn clear_empties_the_log() {
    let log = TransformLog::new();
    log.append(TransformId::new());
    log.clear();
    assert!(log.is_empty());
}

// ── QueryDedupTracker ────────────────────────────────────────────

#[test]
fn first_seen_only_once() {
    let tracker = QueryDedupTracker::new();
    assert!(tracker.first_seen("articles"));
    assert!(!tracker.first_seen("articles"));
    assert!(tracker.first_seen("profiles"));
    assert_eq!(tracker.len(), 2);
}

#[test]
fn forget_allows_another_forward() {
    let tracker = QueryDedupTracker::new();
    tracker.mark("articles");
    assert!(tracker.contains("articles"));
    assert!(tracker.forget("articles"));
    assert!(!tracker.forget("articles"));
    assert!(tracker.first_seen("articles"));
}

#[test]
fn clear_forgets_everything() {
    let tracker = QueryDedupTracker::new();
    tracker.mark("a");
    tracker.mark("b");
    tracker.clear();
    assert!(tracker.is_empty());
}
