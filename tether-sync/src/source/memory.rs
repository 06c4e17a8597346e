//! Volatile in-process cache; the source of truth for reads.

use super::{Capabilities, Source};
use crate::cache::RecordCache;
use crate::dedup::QueryDedupTracker;
use crate::error::SyncResult;
use crate::query::{Query, QueryResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tether_model::{KeyMap, Schema};
use tether_types::{Record, RecordIdentity, Transform};
use tracing::debug;

/// In-memory source. Never suspends.
pub struct MemorySource {
    schema: Arc<Schema>,
    keys: Arc<KeyMap>,
    cache: Mutex<RecordCache>,
    tracker: QueryDedupTracker,
}

impl MemorySource {
    pub fn new(schema: Arc<Schema>, keys: Arc<KeyMap>) -> Self {
        Self {
            schema,
            keys,
            cache: Mutex::new(RecordCache::new()),
            tracker: QueryDedupTracker::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn keys(&self) -> &Arc<KeyMap> {
        &self.keys
    }

    /// Fingerprints of queries already forwarded upstream.
    pub fn tracker(&self) -> &QueryDedupTracker {
        &self.tracker
    }

    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        self.cache().contains(identity)
    }

    pub fn record(&self, identity: &RecordIdentity) -> Option<Record> {
        self.cache().get(identity).cloned()
    }

    pub fn records(&self) -> Vec<Record> {
        self.cache().records().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache().is_empty()
    }

    fn cache(&self) -> MutexGuard<'_, RecordCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, transform: &Transform) -> SyncResult<()> {
        self.cache().apply(transform, &self.schema, &self.keys)?;
        debug!(transform = %transform.id(), ops = transform.len(), "memory applied transform");
        Ok(())
    }
}

#[async_trait]
impl Source for MemorySource {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            queryable: true,
            updatable: true,
            syncable: true,
            ..Capabilities::default()
        }
    }

    async fn query(&self, query: &Query) -> SyncResult<QueryResult> {
        query.validate(&self.schema)?;
        self.cache().query(&query.expression)
    }

    async fn update(&self, transform: &Transform) -> SyncResult<Vec<Transform>> {
        self.apply(transform)?;
        Ok(vec![transform.clone()])
    }

    async fn sync(&self, transform: &Transform) -> SyncResult<()> {
        self.apply(transform)
    }
}
