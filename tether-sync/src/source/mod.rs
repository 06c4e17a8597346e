//! Store abstraction and its three variants.

pub mod backup;
pub mod memory;
pub mod remote;

use crate::error::{SyncError, SyncResult};
use crate::query::{Query, QueryResult};
use async_trait::async_trait;
use tether_types::Transform;

pub use backup::{BackupConfig, BackupSource};
pub use memory::MemorySource;
pub use remote::{RemoteConfig, RemoteSource};

/// Which requests a source accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub queryable: bool,
    pub updatable: bool,
    pub pullable: bool,
    pub pushable: bool,
    pub syncable: bool,
}

impl Capabilities {
    pub const ALL: Self = Self {
        queryable: true,
        updatable: true,
        pullable: true,
        pushable: true,
        syncable: true,
    };
}

/// A store that answers queries and accepts transforms.
///
/// Sources are never called directly by consumers; every request goes
/// through the source's [`SourceHandle`](crate::SourceHandle) and its queue.
/// Requests a source does not support fail with [`SyncError::Unsupported`].
#[async_trait]
pub trait Source: Send + Sync {
    /// Short label for logs and errors ("memory", "remote", "backup").
    fn kind(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Evaluates a read against current state.
    async fn query(&self, query: &Query) -> SyncResult<QueryResult> {
        let _ = query;
        Err(unsupported(self.kind(), "query"))
    }

    /// Applies a transform and returns the transforms committed as a result.
    async fn update(&self, transform: &Transform) -> SyncResult<Vec<Transform>> {
        let _ = transform;
        Err(unsupported(self.kind(), "update"))
    }

    /// Fetches records, described as transforms.
    async fn pull(&self, query: &Query) -> SyncResult<Vec<Transform>> {
        let _ = query;
        Err(unsupported(self.kind(), "pull"))
    }

    /// Forwards a transform to the store and returns what it committed.
    async fn push(&self, transform: &Transform) -> SyncResult<Vec<Transform>> {
        let _ = transform;
        Err(unsupported(self.kind(), "push"))
    }

    /// Merges a transform committed elsewhere.
    async fn sync(&self, transform: &Transform) -> SyncResult<()> {
        let _ = transform;
        Err(unsupported(self.kind(), "sync"))
    }
}

pub(crate) fn unsupported(source: &str, capability: &'static str) -> SyncError {
    SyncError::Unsupported {
        source_name: source.to_string(),
        capability,
    }
}
