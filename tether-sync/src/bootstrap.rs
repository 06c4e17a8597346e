//! The offline-first topology and its cold start.

use crate::coordinator::Coordinator;
use crate::error::{SyncError, SyncResult};
use crate::event::EventKind;
use crate::query::Query;
use crate::source::MemorySource;
use crate::strategy::{
    EventLoggingStrategy, LogTruncationStrategy, QueryDedupFilter, RequestAction, RequestStrategy,
    SkipQueues, Strategy, SyncStrategy,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Source names and blocking flags of the offline-first topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    pub remote: String,
    pub memory: String,
    pub backup: String,
    /// Hold memory queries until the remote pull settles.
    pub blocking_pull: bool,
    /// Hold memory updates until the remote push settles.
    pub blocking_push: bool,
    pub blocking_remote_sync: bool,
    pub blocking_backup_sync: bool,
    pub log_events: bool,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            remote: "remote".to_string(),
            memory: "memory".to_string(),
            backup: "backup".to_string(),
            blocking_pull: true,
            blocking_push: true,
            blocking_remote_sync: true,
            blocking_backup_sync: true,
            log_events: true,
        }
    }
}

/// Strategies of the offline-first topology.
///
/// Memory answers every read; queries it cannot trust are pulled from the
/// remote first, every update is pushed to the remote first, whatever the
/// remote commits is synced into memory, and whatever memory commits is
/// synced into the backup.
pub fn offline_first_strategies(config: &OfflineConfig, memory: Arc<MemorySource>) -> Vec<Box<dyn Strategy>> {
    let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();
    if config.log_events {
        strategies.push(Box::new(EventLoggingStrategy::new("event-logging")));
    }
    strategies.push(Box::new(LogTruncationStrategy::new("log-truncation")));

    strategies.push(Box::new(
        RequestStrategy::new(
            "memory-remote-query",
            &config.memory,
            EventKind::BeforeQuery,
            &config.remote,
            RequestAction::Pull,
        )
        .blocking(config.blocking_pull)
        .filter(QueryDedupFilter::new(memory))
        .catch(SkipQueues),
    ));
    strategies.push(Box::new(
        RequestStrategy::new(
            "memory-remote-update",
            &config.memory,
            EventKind::BeforeUpdate,
            &config.remote,
            RequestAction::Push,
        )
        .blocking(config.blocking_push)
        .catch(SkipQueues),
    ));
    strategies.push(Box::new(
        SyncStrategy::new("remote-memory-sync", &config.remote, &config.memory)
            .blocking(config.blocking_remote_sync),
    ));
    strategies.push(Box::new(
        SyncStrategy::new("memory-backup-sync", &config.memory, &config.backup)
            .blocking(config.blocking_backup_sync),
    ));
    strategies
}

/// Restores memory from the backup, then activates the coordinator.
///
/// Nothing is replicated while the backup is restored, so restored records
/// are not written back to the backup nor pushed anywhere. Returns the
/// number of records restored.
pub async fn bootstrap(coordinator: &mut Coordinator, config: &OfflineConfig) -> SyncResult<usize> {
    if coordinator.is_active() {
        return Err(SyncError::AlreadyActive);
    }
    let backup = Arc::clone(coordinator.source(&config.backup)?);
    let memory = Arc::clone(coordinator.source(&config.memory)?);

    let transforms = backup.pull(Query::find_all_records()).await?;
    let mut restored = 0;
    for transform in transforms {
        restored += transform.records().count();
        memory.sync(transform).await?;
    }

    coordinator.activate()?;
    info!("Restored {} record(s) from {}", restored, config.backup);
    Ok(restored)
}
