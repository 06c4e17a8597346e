//! Per-source log of committed transforms.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tether_types::TransformId;

/// Ids of the transforms a source has committed, oldest first.
#[derive(Debug, Default)]
pub struct TransformLog {
    entries: Mutex<VecDeque<TransformId>>,
}

impl TransformLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, id: TransformId) {
        self.lock().push_back(id);
    }

    pub fn contains(&self, id: TransformId) -> bool {
        self.lock().contains(&id)
    }

    pub fn entries(&self) -> Vec<TransformId> {
        self.lock().iter().copied().collect()
    }

    /// Most recent entry.
    pub fn head(&self) -> Option<TransformId> {
        self.lock().back().copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every entry before `id`. Returns false, leaving the log
    /// untouched, when `id` is not logged.
    pub fn truncate(&self, id: TransformId) -> bool {
        let mut entries = self.lock();
        match entries.iter().position(|e| *e == id) {
            Some(pos) => {
                entries.drain(..pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TransformId>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
