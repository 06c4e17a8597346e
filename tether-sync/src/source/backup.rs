//! Durable local backup on SQLite.
//!
//! One row per record holding its JSON. All SQLite work runs on the blocking
//! thread pool; each transform is written in a single SQL transaction.

use super::{Capabilities, Source};
use crate::cache::{RecordCache, merge_operation};
use crate::error::{SyncError, SyncResult};
use crate::query::{Query, QueryExpression, QueryResult};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tether_model::Schema;
use tether_types::{Operation, Record, RecordIdentity, Transform};
use tracing::{debug, info};

/// Backup source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Database file; `None` keeps the backup in memory.
    pub path: Option<PathBuf>,
    /// Table holding the records.
    pub table: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: "records".to_string(),
        }
    }
}

fn storage_error(context: &str) -> impl Fn(rusqlite::Error) -> SyncError + '_ {
    move |e| SyncError::Source(format!("{context}: {e}"))
}

/// Persistent record store backed by SQLite.
pub struct BackupSource {
    conn: Arc<Mutex<Connection>>,
    table: Arc<str>,
    schema: Arc<Schema>,
}

impl BackupSource {
    /// Opens (or creates) the backup described by `config`.
    pub fn open(config: &BackupConfig, schema: Arc<Schema>) -> SyncResult<Self> {
        let is_identifier = !config.table.is_empty()
            && config
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !is_identifier {
            return Err(SyncError::Validation(format!(
                "invalid backup table name: {}",
                config.table
            )));
        }

        let conn = match &config.path {
            Some(path) => Connection::open(path).map_err(storage_error("failed to open backup"))?,
            None => Connection::open_in_memory()
                .map_err(storage_error("failed to open in-memory backup"))?,
        };
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                record_type TEXT NOT NULL,
                id TEXT NOT NULL,
                json TEXT NOT NULL,
                PRIMARY KEY (record_type, id)
            );",
            config.table
        ))
        .map_err(storage_error("failed to init backup schema"))?;

        info!(path = ?config.path, table = %config.table, "opened backup");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: Arc::from(config.table.as_str()),
            schema,
        })
    }

    /// Opens an in-memory backup (for testing).
    pub fn open_in_memory(schema: Arc<Schema>) -> SyncResult<Self> {
        Self::open(&BackupConfig::default(), schema)
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &str) -> SyncResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let table = Arc::clone(&self.table);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut *conn, &table)
        })
        .await
        .map_err(|e| SyncError::Source(format!("backup task failed: {e}")))?
    }

    pub async fn record_count(&self) -> SyncResult<usize> {
        self.with_conn(|conn, table| {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .map_err(storage_error("failed to count records"))?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
    }

    /// Every stored record, optionally of one type, in insertion order.
    pub async fn load(&self, record_type: Option<String>) -> SyncResult<Vec<Record>> {
        self.with_conn(move |conn, table| load_records(conn, table, record_type.as_deref()))
            .await
    }

    async fn apply(&self, transform: &Transform) -> SyncResult<()> {
        for op in transform.operations() {
            match op.record() {
                Some(record) => self.schema.validate_record(record)?,
                None => self.schema.validate_identity(&op.identity())?,
            }
        }
        let transform = transform.clone();
        self.with_conn(move |conn, table| {
            let tx = conn
                .transaction()
                .map_err(storage_error("failed to begin transaction"))?;
            for op in transform.operations() {
                write_operation(&tx, table, op)?;
            }
            tx.commit().map_err(storage_error("failed to commit transform"))?;
            debug!(transform = %transform.id(), ops = transform.len(), "backup wrote transform");
            Ok(())
        })
        .await
    }

    async fn evaluate(&self, query: &Query) -> SyncResult<QueryResult> {
        query.validate(&self.schema)?;
        let record_type = match &query.expression {
            QueryExpression::FindRecords { record_type, .. } => record_type.clone(),
            other => other.record_type().map(str::to_string),
        };
        let records = self.load(record_type).await?;
        RecordCache::from_records(records).query(&query.expression)
    }
}

fn load_records(
    conn: &Connection,
    table: &str,
    record_type: Option<&str>,
) -> SyncResult<Vec<Record>> {
    let sql = match record_type {
        Some(_) => format!("SELECT json FROM {table} WHERE record_type = ?1 ORDER BY rowid"),
        None => format!("SELECT json FROM {table} ORDER BY rowid"),
    };
    let mut stmt = conn
        .prepare(&sql)
        .map_err(storage_error("failed to prepare load"))?;
    let rows: Vec<String> = match record_type {
        Some(t) => stmt
            .query_map(params![t], |row| row.get(0))
            .and_then(|rows| rows.collect())
            .map_err(storage_error("failed to load records"))?,
        None => stmt
            .query_map([], |row| row.get(0))
            .and_then(|rows| rows.collect())
            .map_err(storage_error("failed to load records"))?,
    };
    rows.iter()
        .map(|json| serde_json::from_str(json).map_err(SyncError::from))
        .collect()
}

fn read_record(conn: &Connection, table: &str, identity: &RecordIdentity) -> SyncResult<Option<Record>> {
    let json: Option<String> = conn
        .query_row(
            &format!("SELECT json FROM {table} WHERE record_type = ?1 AND id = ?2"),
            params![identity.record_type, identity.id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_error("failed to read record"))?;
    json.map(|j| serde_json::from_str(&j).map_err(SyncError::from))
        .transpose()
}

fn write_operation(conn: &Connection, table: &str, op: &Operation) -> SyncResult<()> {
    let identity = op.identity();
    let current = read_record(conn, table, &identity)?;
    match merge_operation(current.as_ref(), op) {
        Some(record) => {
            let json = serde_json::to_string(&record)?;
            let sql = if current.is_some() {
                format!("UPDATE {table} SET json = ?3 WHERE record_type = ?1 AND id = ?2")
            } else {
                format!("INSERT INTO {table} (record_type, id, json) VALUES (?1, ?2, ?3)")
            };
            conn.execute(&sql, params![identity.record_type, identity.id.as_str(), json])
                .map_err(storage_error("failed to write record"))?;
        }
        None => {
            conn.execute(
                &format!("DELETE FROM {table} WHERE record_type = ?1 AND id = ?2"),
                params![identity.record_type, identity.id.as_str()],
            )
            .map_err(storage_error("failed to delete record"))?;
        }
    }
    Ok(())
}

#[async_trait]
impl Source for BackupSource {
    fn kind(&self) -> &'static str {
        "backup"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn query(&self, query: &Query) -> SyncResult<QueryResult> {
        self.evaluate(query).await
    }

    async fn update(&self, transform: &Transform) -> SyncResult<Vec<Transform>> {
        self.apply(transform).await?;
        Ok(vec![transform.clone()])
    }

    /// Records matching `query` as one transform of `AddRecord` operations.
    async fn pull(&self, query: &Query) -> SyncResult<Vec<Transform>> {
        let records = self.evaluate(query).await?.into_records();
        if records.is_empty() {
            return Ok(Vec::new());
        }
        info!("Pulled {} record(s) from backup", records.len());
        Ok(vec![Transform::new(
            records.into_iter().map(Operation::AddRecord).collect(),
        )])
    }

    async fn push(&self, transform: &Transform) -> SyncResult<Vec<Transform>> {
        self.apply(transform).await?;
        Ok(vec![transform.clone()])
    }

    async fn sync(&self, transform: &Transform) -> SyncResult<()> {
        self.apply(transform).await
    }
}
