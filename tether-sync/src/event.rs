//! Source lifecycle events and their listeners.

use crate::error::SyncResult;
use crate::query::{Query, QueryResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tether_types::Transform;
use tracing::warn;

/// Lifecycle event names a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    BeforeQuery,
    Query,
    QueryFail,
    BeforeUpdate,
    Update,
    UpdateFail,
    BeforePull,
    Pull,
    PullFail,
    BeforePush,
    Push,
    PushFail,
    BeforeSync,
    Sync,
    SyncFail,
    Transform,
}

impl EventKind {
    pub const ALL: [EventKind; 16] = [
        Self::BeforeQuery,
        Self::Query,
        Self::QueryFail,
        Self::BeforeUpdate,
        Self::Update,
        Self::UpdateFail,
        Self::BeforePull,
        Self::Pull,
        Self::PullFail,
        Self::BeforePush,
        Self::Push,
        Self::PushFail,
        Self::BeforeSync,
        Self::Sync,
        Self::SyncFail,
        Self::Transform,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::BeforeQuery => "beforeQuery",
            Self::Query => "query",
            Self::QueryFail => "queryFail",
            Self::BeforeUpdate => "beforeUpdate",
            Self::Update => "update",
            Self::UpdateFail => "updateFail",
            Self::BeforePull => "beforePull",
            Self::Pull => "pull",
            Self::PullFail => "pullFail",
            Self::BeforePush => "beforePush",
            Self::Push => "push",
            Self::PushFail => "pushFail",
            Self::BeforeSync => "beforeSync",
            Self::Sync => "sync",
            Self::SyncFail => "syncFail",
            Self::Transform => "transform",
        }
    }

    /// Whether events of this kind carry a query.
    pub fn carries_query(self) -> bool {
        matches!(
            self,
            Self::BeforeQuery | Self::Query | Self::QueryFail | Self::BeforePull | Self::Pull | Self::PullFail
        )
    }

    /// Whether events of this kind carry a transform.
    pub fn carries_transform(self) -> bool {
        !self.carries_query()
    }

    /// Whether this kind fires on a source's sync queue.
    pub fn is_sync(self) -> bool {
        matches!(self, Self::BeforeSync | Self::Sync | Self::SyncFail)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An event emitted by a source, with its payload.
///
/// `*Fail` events carry the error message of the failed request.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    BeforeQuery(Query),
    Query(Query, QueryResult),
    QueryFail(Query, String),
    BeforeUpdate(Transform),
    Update(Transform),
    UpdateFail(Transform, String),
    BeforePull(Query),
    Pull(Query, Vec<Transform>),
    PullFail(Query, String),
    BeforePush(Transform),
    Push(Transform, Vec<Transform>),
    PushFail(Transform, String),
    BeforeSync(Transform),
    Sync(Transform),
    SyncFail(Transform, String),
    /// A transform was committed.
    Transform(Transform),
}

impl SourceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::BeforeQuery(..) => EventKind::BeforeQuery,
            Self::Query(..) => EventKind::Query,
            Self::QueryFail(..) => EventKind::QueryFail,
            Self::BeforeUpdate(..) => EventKind::BeforeUpdate,
            Self::Update(..) => EventKind::Update,
            Self::UpdateFail(..) => EventKind::UpdateFail,
            Self::BeforePull(..) => EventKind::BeforePull,
            Self::Pull(..) => EventKind::Pull,
            Self::PullFail(..) => EventKind::PullFail,
            Self::BeforePush(..) => EventKind::BeforePush,
            Self::Push(..) => EventKind::Push,
            Self::PushFail(..) => EventKind::PushFail,
            Self::BeforeSync(..) => EventKind::BeforeSync,
            Self::Sync(..) => EventKind::Sync,
            Self::SyncFail(..) => EventKind::SyncFail,
            Self::Transform(..) => EventKind::Transform,
        }
    }

    /// The query the event is about, if any.
    pub fn query(&self) -> Option<&Query> {
        match self {
            Self::BeforeQuery(q)
            | Self::Query(q, _)
            | Self::QueryFail(q, _)
            | Self::BeforePull(q)
            | Self::Pull(q, _)
            | Self::PullFail(q, _) => Some(q),
            _ => None,
        }
    }

    /// The transform the event is about, if any.
    pub fn transform(&self) -> Option<&Transform> {
        match self {
            Self::BeforeUpdate(t)
            | Self::Update(t)
            | Self::UpdateFail(t, _)
            | Self::BeforePush(t)
            | Self::Push(t, _)
            | Self::PushFail(t, _)
            | Self::BeforeSync(t)
            | Self::Sync(t)
            | Self::SyncFail(t, _)
            | Self::Transform(t) => Some(t),
            _ => None,
        }
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        match self {
            Self::QueryFail(q, error) | Self::PullFail(q, error) => {
                format!("{} failed: {error}", q.fingerprint())
            }
            Self::UpdateFail(t, error) | Self::PushFail(t, error) | Self::SyncFail(t, error) => {
                format!("transform {} failed: {error}", t.id())
            }
            Self::Query(q, result) => format!("{} -> {} record(s)", q.fingerprint(), result.len()),
            Self::Pull(q, transforms) => {
                format!("{} -> {} transform(s)", q.fingerprint(), transforms.len())
            }
            Self::Push(t, transforms) => {
                format!("transform {} -> {} transform(s)", t.id(), transforms.len())
            }
            other => match (other.query(), other.transform()) {
                (Some(q), _) => q.fingerprint(),
                (_, Some(t)) => format!("transform {} ({} op(s))", t.id(), t.len()),
                _ => String::new(),
            },
        }
    }
}

/// Receives source events.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn on_event(&self, event: &SourceEvent) -> SyncResult<()>;
}

#[async_trait]
impl<F> Listener for F
where
    F: Fn(&SourceEvent) -> SyncResult<()> + Send + Sync,
{
    async fn on_event(&self, event: &SourceEvent) -> SyncResult<()> {
        self(event)
    }
}

/// Handle returned by [`EventHub::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscription {
    id: ListenerId,
    kind: EventKind,
    listener: Arc<dyn Listener>,
}

/// Per-source listener registry.
///
/// Listeners run in registration order, one at a time.
#[derive(Default)]
pub struct EventHub {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, kind: EventKind, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { id, kind, listener });
        id
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    fn listeners(&self, kind: EventKind) -> Vec<Arc<dyn Listener>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| Arc::clone(&s.listener))
            .collect()
    }

    /// Runs listeners in series; the first error aborts the rest.
    pub async fn fulfill(&self, event: &SourceEvent) -> SyncResult<()> {
        for listener in self.listeners(event.kind()) {
            listener.on_event(event).await?;
        }
        Ok(())
    }

    /// Runs every listener in series. Failures are logged and the first one
    /// is returned once all listeners have run.
    pub async fn settle(&self, event: &SourceEvent) -> SyncResult<()> {
        let mut first_error = None;
        for listener in self.listeners(event.kind()) {
            if let Err(error) = listener.on_event(event).await {
                warn!(event = %event.kind(), %error, "listener failed");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
