//! Fingerprints of queries already forwarded upstream.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Set of query fingerprints a memory source has already forwarded.
///
/// Owned by one [`MemorySource`](crate::MemorySource) and dropped with it;
/// nothing is persisted.
#[derive(Debug, Default)]
pub struct QueryDedupTracker {
    seen: Mutex<HashSet<String>>,
}

impl QueryDedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `fingerprint` as seen, returning whether it was new.
    pub fn first_seen(&self, fingerprint: &str) -> bool {
        self.lock().insert(fingerprint.to_string())
    }

    pub fn mark(&self, fingerprint: &str) {
        self.lock().insert(fingerprint.to_string());
    }

    /// Forgets `fingerprint` so the next identical query is forwarded again.
    pub fn forget(&self, fingerprint: &str) -> bool {
        self.lock().remove(fingerprint)
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.lock().contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
