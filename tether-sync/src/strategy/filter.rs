//! Forwarding filters and forward-failure handlers.

use crate::error::{SyncError, SyncResult};
use crate::event::SourceEvent;
use crate::handle::SourceHandle;
use crate::query::QueryExpression;
use crate::source::MemorySource;
use std::sync::Arc;
use tracing::debug;

/// Decides whether an event is forwarded.
pub trait RequestFilter: Send + Sync {
    fn should_forward(&self, event: &SourceEvent) -> bool;

    /// Called when a forward this filter let through has failed.
    fn forward_failed(&self, event: &SourceEvent, error: &SyncError) {
        let _ = (event, error);
    }
}

impl<F> RequestFilter for F
where
    F: Fn(&SourceEvent) -> bool + Send + Sync,
{
    fn should_forward(&self, event: &SourceEvent) -> bool {
        self(event)
    }
}

/// Forwards a memory query upstream only when the cache cannot be trusted
/// to answer it.
///
/// A query is forwarded when it asks for a reload, when it targets a single
/// record the cache lacks, or when its fingerprint has not been forwarded
/// before. Collections are not refreshed after their first forward; a
/// failed forward is forgotten so the next identical query tries again.
pub struct QueryDedupFilter {
    memory: Arc<MemorySource>,
}

impl QueryDedupFilter {
    pub fn new(memory: Arc<MemorySource>) -> Self {
        Self { memory }
    }
}

impl RequestFilter for QueryDedupFilter {
    fn should_forward(&self, event: &SourceEvent) -> bool {
        let Some(query) = event.query() else {
            return true;
        };
        let fingerprint = query.fingerprint();
        let tracker = self.memory.tracker();

        if query.options.reload {
            tracker.mark(&fingerprint);
            return true;
        }
        if let QueryExpression::FindRecord { record } = &query.expression {
            if !self.memory.contains(record) {
                tracker.mark(&fingerprint);
                return true;
            }
        }
        let forward = tracker.first_seen(&fingerprint);
        if !forward {
            debug!(%fingerprint, "served from cache");
        }
        forward
    }

    fn forward_failed(&self, event: &SourceEvent, _error: &SyncError) {
        if let Some(query) = event.query() {
            self.memory.tracker().forget(&query.fingerprint());
        }
    }
}

/// What a failed blocking forward was about.
pub struct FailureContext {
    pub strategy: String,
    pub source: Arc<SourceHandle>,
    pub target: Arc<SourceHandle>,
    pub event: SourceEvent,
}

/// Runs when a blocking forward fails, before the error reaches the
/// originating request. Returning `Ok` lets the originating request proceed.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, context: &FailureContext, error: SyncError) -> SyncResult<()>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&FailureContext, SyncError) -> SyncResult<()> + Send + Sync,
{
    fn handle(&self, context: &FailureContext, error: SyncError) -> SyncResult<()> {
        self(context, error)
    }
}

/// Keeps both queues moving after a failed forward, then re-raises.
///
/// The originating entry is marked to be discarded once it settles. The
/// target's head is skipped only when the error stalled it; otherwise the
/// target has already moved on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipQueues;

impl ErrorHandler for SkipQueues {
    fn handle(&self, context: &FailureContext, error: SyncError) -> SyncResult<()> {
        context.source.queue_for(context.event.kind()).skip();
        let target_queue = context.target.request_queue();
        if error.halts_queue() && target_queue.is_stalled() {
            target_queue.skip();
        }
        debug!(
            strategy = %context.strategy,
            source = %context.source.name(),
            target = %context.target.name(),
            %error,
            "skipped queues after failed forward"
        );
        Err(error)
    }
}
