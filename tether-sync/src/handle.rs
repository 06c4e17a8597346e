//! Queue-mediated front of a source.

use crate::error::{SyncError, SyncResult};
use crate::event::{EventHub, EventKind, SourceEvent};
use crate::log::TransformLog;
use crate::query::{Query, QueryResult};
use crate::queue::{Request, RequestProcessor, RequestQueue, Response};
use crate::source::{Capabilities, Source, unsupported};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tether_types::{Transform, TransformId};
use tracing::debug;

/// A named source with its queues, events and transform log.
///
/// Every request goes through one of the source's two queues: queries,
/// updates, pulls and pushes share the request queue, while syncs have a
/// queue of their own. A sync triggered while the request queue waits on a
/// forwarded request would otherwise wait behind that very request.
///
/// The sync queue never stalls: a failed sync leaves the source as of its
/// last successful sync, and later syncs still run.
pub struct SourceHandle {
    name: String,
    source: Arc<dyn Source>,
    requests: RequestQueue,
    syncs: RequestQueue,
    events: EventHub,
    log: TransformLog,
    /// Updates whose before-hooks are running, and whether their transform
    /// has meanwhile arrived through `sync`.
    in_flight: Mutex<HashMap<TransformId, bool>>,
}

impl SourceHandle {
    /// Wraps `source` and starts its queue workers.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(name: impl Into<String>, source: Arc<dyn Source>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|handle: &Weak<SourceHandle>| {
            let processor: Weak<dyn RequestProcessor> = handle.clone();
            Self {
                requests: RequestQueue::new(format!("{name}:requests"), processor.clone()),
                syncs: RequestQueue::without_stalls(format!("{name}:syncs"), processor),
                name,
                source,
                events: EventHub::new(),
                log: TransformLog::new(),
                in_flight: Mutex::new(HashMap::new()),
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub fn capabilities(&self) -> Capabilities {
        self.source.capabilities()
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn log(&self) -> &TransformLog {
        &self.log
    }

    pub fn request_queue(&self) -> &RequestQueue {
        &self.requests
    }

    pub fn sync_queue(&self) -> &RequestQueue {
        &self.syncs
    }

    /// Queue on which events of `kind` fire.
    pub fn queue_for(&self, kind: EventKind) -> &RequestQueue {
        if kind.is_sync() { &self.syncs } else { &self.requests }
    }

    pub fn query(&self, query: Query) -> BoxFuture<'static, SyncResult<QueryResult>> {
        if !self.capabilities().queryable {
            return future::ready(Err(unsupported(&self.name, "query"))).boxed();
        }
        let response = self.requests.enqueue(Request::Query(query));
        let name = self.name.clone();
        async move {
            match response.await? {
                Response::Query(result) => Ok(result),
                other => Err(mismatched(&name, "query", &other)),
            }
        }
        .boxed()
    }

    /// Applies `transform`, resolving once it has been applied (or found to
    /// be applied already when its turn in the queue came).
    pub fn update(&self, transform: Transform) -> BoxFuture<'static, SyncResult<Transform>> {
        if !self.capabilities().updatable {
            return future::ready(Err(unsupported(&self.name, "update"))).boxed();
        }
        let response = self.requests.enqueue(Request::Update(transform));
        let name = self.name.clone();
        async move {
            match response.await? {
                Response::Update(transform) => Ok(transform),
                other => Err(mismatched(&name, "update", &other)),
            }
        }
        .boxed()
    }

    pub fn pull(&self, query: Query) -> BoxFuture<'static, SyncResult<Vec<Transform>>> {
        if !self.capabilities().pullable {
            return future::ready(Err(unsupported(&self.name, "pull"))).boxed();
        }
        let response = self.requests.enqueue(Request::Pull(query));
        let name = self.name.clone();
        async move {
            match response.await? {
                Response::Pull(transforms) => Ok(transforms),
                other => Err(mismatched(&name, "pull", &other)),
            }
        }
        .boxed()
    }

    pub fn push(&self, transform: Transform) -> BoxFuture<'static, SyncResult<Vec<Transform>>> {
        if !self.capabilities().pushable {
            return future::ready(Err(unsupported(&self.name, "push"))).boxed();
        }
        let response = self.requests.enqueue(Request::Push(transform));
        let name = self.name.clone();
        async move {
            match response.await? {
                Response::Push(transforms) => Ok(transforms),
                other => Err(mismatched(&name, "push", &other)),
            }
        }
        .boxed()
    }

    /// Merges a transform committed by another source.
    ///
    /// Admitted to the sync queue before this returns, so syncs into one
    /// source apply in call order.
    pub fn sync(&self, transform: Transform) -> BoxFuture<'static, SyncResult<()>> {
        if !self.capabilities().syncable {
            return future::ready(Err(unsupported(&self.name, "sync"))).boxed();
        }
        let response = self.syncs.enqueue(Request::Sync(transform));
        let name = self.name.clone();
        async move {
            match response.await? {
                Response::Sync => Ok(()),
                other => Err(mismatched(&name, "sync", &other)),
            }
        }
        .boxed()
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<TransformId, bool>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Logs and announces committed transforms.
    ///
    /// A failing `transform` listener (a blocking sync downstream) does not
    /// undo the commit; it is reported as [`SyncError::Replication`].
    async fn transformed(&self, transforms: &[Transform]) -> SyncResult<()> {
        for transform in transforms {
            if transform.is_empty() || self.log.contains(transform.id()) {
                continue;
            }
            self.log.append(transform.id());
            debug!(source = %self.name, transform = %transform.id(), "transform committed");
            self.events
                .settle(&SourceEvent::Transform(transform.clone()))
                .await
                .map_err(|cause| SyncError::Replication {
                    origin: self.name.clone(),
                    cause: Box::new(cause),
                })?;
        }
        Ok(())
    }

    /// Settles the after-event; listener failures there are only logged.
    async fn settle_after(&self, event: SourceEvent) {
        let _ = self.events.settle(&event).await;
    }

    async fn process_query(&self, query: &Query) -> SyncResult<Response> {
        let outcome: SyncResult<QueryResult> = async {
            self.events
                .fulfill(&SourceEvent::BeforeQuery(query.clone()))
                .await?;
            self.source.query(query).await
        }
        .await;
        match outcome {
            Ok(result) => {
                self.settle_after(SourceEvent::Query(query.clone(), result.clone()))
                    .await;
                Ok(Response::Query(result))
            }
            Err(error) => {
                self.settle_after(SourceEvent::QueryFail(query.clone(), error.to_string()))
                    .await;
                Err(error)
            }
        }
    }

    async fn process_update(&self, transform: &Transform) -> SyncResult<Response> {
        let id = transform.id();
        if self.log.contains(id) {
            return Ok(Response::Update(transform.clone()));
        }
        self.in_flight().insert(id, false);

        let outcome: SyncResult<()> = async {
            let hooks = self
                .events
                .fulfill(&SourceEvent::BeforeUpdate(transform.clone()))
                .await;
            let synced = self.in_flight().remove(&id).unwrap_or(false);
            hooks?;
            if synced || self.log.contains(id) {
                debug!(source = %self.name, transform = %id, "update already applied by sync");
                return Ok(());
            }
            let committed = self.source.update(transform).await?;
            self.transformed(&committed).await
        }
        .await;

        match outcome {
            Ok(()) => {
                self.settle_after(SourceEvent::Update(transform.clone())).await;
                Ok(Response::Update(transform.clone()))
            }
            Err(error) => {
                self.settle_after(SourceEvent::UpdateFail(transform.clone(), error.to_string()))
                    .await;
                Err(error)
            }
        }
    }

    async fn process_pull(&self, query: &Query) -> SyncResult<Response> {
        let outcome: SyncResult<Vec<Transform>> = async {
            self.events
                .fulfill(&SourceEvent::BeforePull(query.clone()))
                .await?;
            let transforms = self.source.pull(query).await?;
            self.transformed(&transforms).await?;
            Ok(transforms)
        }
        .await;
        match outcome {
            Ok(transforms) => {
                self.settle_after(SourceEvent::Pull(query.clone(), transforms.clone()))
                    .await;
                Ok(Response::Pull(transforms))
            }
            Err(error) => {
                self.settle_after(SourceEvent::PullFail(query.clone(), error.to_string()))
                    .await;
                Err(error)
            }
        }
    }

    async fn process_push(&self, transform: &Transform) -> SyncResult<Response> {
        if self.log.contains(transform.id()) {
            return Ok(Response::Push(Vec::new()));
        }
        let outcome: SyncResult<Vec<Transform>> = async {
            self.events
                .fulfill(&SourceEvent::BeforePush(transform.clone()))
                .await?;
            let transforms = self.source.push(transform).await?;
            self.transformed(&transforms).await?;
            Ok(transforms)
        }
        .await;
        match outcome {
            Ok(transforms) => {
                self.settle_after(SourceEvent::Push(transform.clone(), transforms.clone()))
                    .await;
                Ok(Response::Push(transforms))
            }
            Err(error) => {
                self.settle_after(SourceEvent::PushFail(transform.clone(), error.to_string()))
                    .await;
                Err(error)
            }
        }
    }

    async fn process_sync(&self, transform: &Transform) -> SyncResult<Response> {
        if self.log.contains(transform.id()) {
            return Ok(Response::Sync);
        }
        let outcome: SyncResult<()> = async {
            self.events
                .fulfill(&SourceEvent::BeforeSync(transform.clone()))
                .await?;
            self.source.sync(transform).await?;
            {
                let mut in_flight = self.in_flight();
                if let Some(synced) = in_flight.get_mut(&transform.id()) {
                    *synced = true;
                }
            }
            self.transformed(std::slice::from_ref(transform)).await
        }
        .await;
        match outcome {
            Ok(()) => {
                self.settle_after(SourceEvent::Sync(transform.clone())).await;
                Ok(Response::Sync)
            }
            Err(error) => {
                self.settle_after(SourceEvent::SyncFail(transform.clone(), error.to_string()))
                    .await;
                Err(error)
            }
        }
    }
}

#[async_trait]
impl RequestProcessor for SourceHandle {
    async fn process(&self, request: &Request) -> SyncResult<Response> {
        match request {
            Request::Query(query) => self.process_query(query).await,
            Request::Update(transform) => self.process_update(transform).await,
            Request::Pull(query) => self.process_pull(query).await,
            Request::Push(transform) => self.process_push(transform).await,
            Request::Sync(transform) => self.process_sync(transform).await,
        }
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("name", &self.name)
            .field("kind", &self.source.kind())
            .field("log_len", &self.log.len())
            .finish()
    }
}

fn mismatched(source: &str, request: &str, response: &Response) -> SyncError {
    SyncError::Source(format!(
        "{source}: unexpected response to {request}: {response:?}"
    ))
}
