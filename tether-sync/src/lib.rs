//! Offline-first sync coordinator.
//!
//! Keeps an in-memory cache, a remote JSON:API store and a durable SQLite
//! backup consistent: reads are answered by memory, writes propagate
//! outward, and memory is restored from the backup at startup.
//!
//! # Architecture
//!
//! - **Sources**: the stores ([`MemorySource`], [`RemoteSource`],
//!   [`BackupSource`]), each wrapped in a [`SourceHandle`] that owns its
//!   request queues, event hub and transform log
//! - **Request queues**: per-source FIFO sequencers; every request goes
//!   through one, so each source observes a single total order
//! - **Strategies**: declarative replication rules between sources
//!   ([`RequestStrategy`], [`SyncStrategy`], [`EventLoggingStrategy`],
//!   [`LogTruncationStrategy`])
//! - **Coordinator**: owns sources and strategies, and activates them
//!
//! ## Standard topology
//!
//! 1. memory `beforeQuery` → remote `pull` (blocking, deduplicated)
//! 2. memory `beforeUpdate` → remote `push` (blocking)
//! 3. remote `transform` → memory `sync`
//! 4. memory `transform` → backup `sync`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_model::KeyMap;
//! use tether_sync::{
//!     BackupConfig, BackupSource, Coordinator, MemorySource, OfflineConfig, Query,
//!     RemoteConfig, RemoteSource, bootstrap, offline_first_strategies,
//! };
//!
//! # async fn run() -> tether_sync::SyncResult<()> {
//! let remote_config = RemoteConfig::default();
//! let schema = Arc::new(RemoteSource::fetch_schema(&remote_config).await?);
//! let keys = Arc::new(KeyMap::new());
//!
//! let memory = Arc::new(MemorySource::new(Arc::clone(&schema), Arc::clone(&keys)));
//! let remote = RemoteSource::new(remote_config, Arc::clone(&schema), keys)?;
//! let backup = BackupSource::open(&BackupConfig::default(), schema)?;
//!
//! let config = OfflineConfig::default();
//! let mut coordinator = Coordinator::new();
//! let store = coordinator.add_source(&config.memory, memory.clone())?;
//! coordinator.add_source(&config.remote, Arc::new(remote))?;
//! coordinator.add_source(&config.backup, Arc::new(backup))?;
//! for strategy in offline_first_strategies(&config, memory) {
//!     coordinator.add_strategy(strategy)?;
//! }
//! bootstrap(&mut coordinator, &config).await?;
//!
//! let articles = store.query(Query::find_records("article")).await?;
//! # let _ = articles;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
mod cache;
pub mod coordinator;
mod dedup;
mod error;
pub mod event;
mod handle;
mod log;
pub mod query;
pub mod queue;
mod serializer;
pub mod source;
pub mod strategy;

pub use bootstrap::{OfflineConfig, bootstrap, offline_first_strategies};
pub use cache::RecordCache;
pub use coordinator::{Coordinator, SourceSet};
pub use dedup::QueryDedupTracker;
pub use error::{SyncError, SyncResult};
pub use event::{EventHub, EventKind, Listener, ListenerId, SourceEvent};
pub use handle::SourceHandle;
pub use log::TransformLog;
pub use query::{
    FilterOp, FilterSpecifier, PageSpecifier, Query, QueryExpression, QueryOptions, QueryResult,
    SortOrder, SortSpecifier,
};
pub use queue::{EntryId, QueueStatus, Request, RequestProcessor, RequestQueue, Response};
pub use serializer::{Document, JsonApiSerializer, Resource};
pub use source::{
    BackupConfig, BackupSource, Capabilities, MemorySource, RemoteConfig, RemoteSource, Source,
};
pub use strategy::{
    BindingAction, ErrorHandler, EventLoggingStrategy, FailureContext, LogTruncationStrategy,
    QueryDedupFilter, RequestAction, RequestFilter, RequestStrategy, SkipQueues, Strategy,
    StrategyBinding, StrategyKind, SyncStrategy,
};

// Re-export the shared data model
pub use tether_model::{KeyMap, Schema};
pub use tether_types::{Operation, Record, RecordId, RecordIdentity, Transform, TransformId};
