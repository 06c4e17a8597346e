//! Replication rules between sources.
//!
//! A strategy declares its bindings up front ([`Strategy::bindings`]) and
//! installs matching listeners on activation. Listeners hold weak references
//! to the sources they forward to, so an active strategy never keeps a
//! source alive on its own.

pub mod filter;
pub mod logging;
pub mod request;
pub mod sync;
pub mod truncation;

use crate::coordinator::SourceSet;
use crate::error::{SyncError, SyncResult};
use crate::event::{EventKind, Listener, ListenerId};
use crate::handle::SourceHandle;
use serde::Serialize;
use std::sync::{Arc, Weak};

pub use filter::{ErrorHandler, FailureContext, QueryDedupFilter, RequestFilter, SkipQueues};
pub use logging::EventLoggingStrategy;
pub use request::{RequestAction, RequestStrategy};
pub use sync::SyncStrategy;
pub use truncation::LogTruncationStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StrategyKind {
    Request,
    Sync,
    EventLogging,
    LogTruncation,
}

impl StrategyKind {
    /// Observability strategies are activated before any other.
    pub fn is_observability(self) -> bool {
        matches!(self, Self::EventLogging | Self::LogTruncation)
    }
}

/// What a binding does when its event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingAction {
    Pull,
    Push,
    Sync,
    Log,
    Truncate,
}

/// One row of the coordinator's replication table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyBinding {
    pub strategy: String,
    pub source: String,
    pub event: EventKind,
    pub target: Option<String>,
    pub action: BindingAction,
    pub blocking: bool,
    pub filtered: bool,
    pub handles_errors: bool,
}

/// A replication rule.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> StrategyKind;

    /// The (source, event, target, action) rows this strategy installs.
    fn bindings(&self) -> Vec<StrategyBinding>;

    fn activate(&mut self, sources: &SourceSet) -> SyncResult<()>;

    /// Removes every listener installed by `activate`.
    fn deactivate(&mut self);
}

/// Listeners installed by one strategy.
#[derive(Default)]
pub(crate) struct Subscriptions {
    installed: Vec<(Arc<SourceHandle>, ListenerId)>,
}

impl Subscriptions {
    pub(crate) fn on(&mut self, handle: &Arc<SourceHandle>, kind: EventKind, listener: Arc<dyn Listener>) {
        let id = handle.events().on(kind, listener);
        self.installed.push((Arc::clone(handle), id));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        for (handle, id) in self.installed.drain(..) {
            handle.events().off(id);
        }
    }
}

pub(crate) fn upgrade(handle: &Weak<SourceHandle>, name: &str) -> SyncResult<Arc<SourceHandle>> {
    handle
        .upgrade()
        .ok_or_else(|| SyncError::UnknownSource(name.to_string()))
}
