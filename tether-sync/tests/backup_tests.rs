mod common;

use common::{article, profile};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use tether_sync::{
    BackupConfig, BackupSource, Operation, Query, Record, RecordIdentity, Source, SyncError,
    Transform,
};

fn file_config(dir: &TempDir) -> BackupConfig {
    BackupConfig {
        path: Some(dir.path().join("backup.db")),
        ..Default::default()
    }
}

// ── Config ───────────────────────────────────────────────────────

#[test]
fn backup_config_default() {
    let cfg = BackupConfig::default();
    assert_eq!(cfg.path, None);
    assert_eq!(cfg.table, "records");
}

#[test]
fn rejects_unsafe_table_name() {
    let cfg = BackupConfig {
        table: "records; DROP TABLE x".into(),
        ..Default::default()
    };
    let err = BackupSource::open(&cfg, common::schema()).err().unwrap();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[test]
fn custom_table_name() {
    let cfg = BackupConfig {
        table: "tether_records".into(),
        ..Default::default()
    };
    BackupSource::open(&cfg, common::schema()).unwrap();
}

// ── Durability ───────────────────────────────────────────────────

#[tokio::test]
async fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let backup = BackupSource::open(&file_config(&dir), common::schema()).unwrap();
        backup
            .update(&Transform::new(vec![
                Operation::AddRecord(article("a1", "One")),
                Operation::AddRecord(profile("p1", "jake")),
            ]))
            .await
            .unwrap();
    }

    let backup = BackupSource::open(&file_config(&dir), common::schema()).unwrap();
    assert_eq!(backup.record_count().await.unwrap(), 2);
    let articles = backup.load(Some("article".into())).await.unwrap();
    assert_eq!(articles, vec![article("a1", "One")]);
}

#[tokio::test]
async fn update_merges_and_remove_deletes() {
    let backup = BackupSource::open_in_memory(common::schema()).unwrap();
    backup
        .update(&Transform::add_record(article("a1", "One")))
        .await
        .unwrap();
    backup
        .sync(&Transform::update_record(
            Record::new("article", "a1").with_attribute("slug", "one"),
        ))
        .await
        .unwrap();

    let record = backup.load(None).await.unwrap().remove(0);
    assert_eq!(record.get_str("title"), Some("One"));
    assert_eq!(record.get_str("slug"), Some("one"));

    backup
        .push(&Transform::remove_record(RecordIdentity::new("article", "a1")))
        .await
        .unwrap();
    assert_eq!(backup.record_count().await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_transform_writes_nothing() {
    let backup = BackupSource::open_in_memory(common::schema()).unwrap();
    let err = backup
        .update(&Transform::new(vec![
            Operation::AddRecord(article("a1", "Fine")),
            Operation::AddRecord(Record::new("unicorn", "u1")),
        ]))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
    assert_eq!(backup.record_count().await.unwrap(), 0);
}

// ── Reads ────────────────────────────────────────────────────────

#[tokio::test]
async fn full_pull_is_one_transform_of_adds() {
    let backup = BackupSource::open_in_memory(common::schema()).unwrap();
    backup
        .update(&Transform::new(vec![
            Operation::AddRecord(article("a1", "One")),
            Operation::AddRecord(article("a2", "Two")),
            Operation::AddRecord(profile("p1", "jake")),
        ]))
        .await
        .unwrap();

    let transforms = backup.pull(&Query::find_all_records()).await.unwrap();
    assert_eq!(transforms.len(), 1);
    assert_eq!(transforms[0].len(), 3);
    assert!(
        transforms[0]
            .operations()
            .iter()
            .all(|op| matches!(op, Operation::AddRecord(_)))
    );
}

#[tokio::test]
async fn empty_backup_pulls_nothing() {
    let backup = BackupSource::open_in_memory(common::schema()).unwrap();
    assert!(backup.pull(&Query::find_all_records()).await.unwrap().is_empty());
}

#[tokio::test]
async fn queries_evaluate_filters() {
    let backup = BackupSource::open_in_memory(common::schema()).unwrap();
    backup
        .update(&Transform::new(vec![
            Operation::AddRecord(article("a1", "One").with_attribute("slug", "one")),
            Operation::AddRecord(article("a2", "Two").with_attribute("slug", "two")),
        ]))
        .await
        .unwrap();

    let result = backup
        .query(&Query::find_records("article").filter("slug", json!("two")))
        .await
        .unwrap();
    assert_eq!(result.into_record().unwrap().id.as_str(), "a2");

    let err = backup
        .query(&Query::find_record(RecordIdentity::new("article", "zz")))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}
