//! Error types for the sync layer.

use tether_model::ModelError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An operation violates the schema.
    #[error("validation error: {0}")]
    Validation(String),

    /// A single-record query matched nothing.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The store rejected a write, e.g. a stale or conflicting remote id.
    #[error("conflict: {0}")]
    Conflict(String),

    /// I/O failure of a remote or durable store.
    #[error("source error: {0}")]
    Source(String),

    /// Network error before any response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// The queue is halted on a failed entry awaiting `skip`, `retry` or `clear`.
    #[error("request queue {queue} is stalled")]
    QueueStalled { queue: String },

    /// A blocking replication of a committed transform failed.
    #[error("replication from {origin} failed: {cause}")]
    Replication {
        origin: String,
        #[source]
        cause: Box<SyncError>,
    },

    /// The entry was discarded before it executed.
    #[error("request skipped on queue {queue}")]
    Skipped { queue: String },

    #[error("{source_name} does not support {capability}")]
    Unsupported {
        source_name: String,
        capability: &'static str,
    },

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("coordinator is already active")]
    AlreadyActive,

    #[error("coordinator is not active")]
    NotActive,

    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,

    /// Timeout.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Whether a request that failed with this error halts its queue.
    ///
    /// Transient I/O failures keep the entry at the head of the queue until
    /// it is skipped, retried or cleared. Deterministic rejections are
    /// delivered and the queue moves on.
    pub fn halts_queue(&self) -> bool {
        matches!(self, Self::Source(_) | Self::Network(_) | Self::Timeout)
    }

    /// The innermost error of a replication chain.
    pub fn root_cause(&self) -> &SyncError {
        match self {
            Self::Replication { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<ModelError> for SyncError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::KeyConflict { .. } => Self::Conflict(e.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}
