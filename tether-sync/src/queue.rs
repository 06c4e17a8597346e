//! Per-source FIFO request queue.
//!
//! Each queue owns one worker task that executes entries strictly in arrival
//! order, one at a time. Entries are admitted synchronously by
//! [`RequestQueue::enqueue`], so the order of calls fixes the order of
//! execution even when callers await the returned futures later.

use crate::error::{SyncError, SyncResult};
use crate::query::{Query, QueryResult};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tether_types::Transform;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, warn};

/// A request issued against a source.
#[derive(Debug, Clone)]
pub enum Request {
    Query(Query),
    Update(Transform),
    Pull(Query),
    Push(Transform),
    Sync(Transform),
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Query(_) => "query",
            Self::Update(_) => "update",
            Self::Pull(_) => "pull",
            Self::Push(_) => "push",
            Self::Sync(_) => "sync",
        }
    }
}

/// Outcome of a processed request.
#[derive(Debug, Clone)]
pub enum Response {
    Query(QueryResult),
    Update(Transform),
    Pull(Vec<Transform>),
    Push(Vec<Transform>),
    Sync,
}

/// Executes the requests of a queue.
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    async fn process(&self, request: &Request) -> SyncResult<Response>;
}

pub type EntryId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueStatus {
    Idle,
    Processing(EntryId),
    /// The head entry failed with a queue-halting error.
    Stalled { entry: EntryId, error: String },
}

type Responder = oneshot::Sender<SyncResult<Response>>;

struct Entry {
    id: EntryId,
    request: Request,
    responder: Option<Responder>,
}

struct QueueState {
    entries: VecDeque<Entry>,
    status: QueueStatus,
    skip_current: bool,
    next_id: EntryId,
    closed: bool,
}

struct Shared {
    name: String,
    /// Whether queue-halting errors stall the queue.
    stalls: bool,
    state: Mutex<QueueState>,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn skipped(&self) -> SyncError {
        SyncError::Skipped {
            queue: self.name.clone(),
        }
    }

    /// Records the outcome of the executing entry.
    fn finish(&self, id: EntryId, result: SyncResult<Response>) {
        let mut state = self.lock();
        let skip = std::mem::take(&mut state.skip_current);
        if state.entries.front().map(|e| e.id) != Some(id) {
            state.status = QueueStatus::Idle;
            return;
        }

        match result {
            Err(error) if self.stalls && error.halts_queue() && !skip => {
                let responder = state.entries.front_mut().and_then(|e| e.responder.take());
                state.status = QueueStatus::Stalled {
                    entry: id,
                    error: error.to_string(),
                };
                drop(state);
                warn!(queue = %self.name, entry = id, %error, "request queue stalled");
                if let Some(tx) = responder {
                    let _ = tx.send(Err(error));
                }
            }
            result => {
                let entry = state.entries.pop_front();
                state.status = QueueStatus::Idle;
                drop(state);
                if skip {
                    debug!(queue = %self.name, entry = id, "skipped entry settled");
                }
                if let Some(tx) = entry.and_then(|e| e.responder) {
                    let _ = tx.send(result);
                }
                self.wake.notify_one();
            }
        }
    }
}

/// FIFO sequencer bound to one source.
pub struct RequestQueue {
    shared: Arc<Shared>,
}

impl RequestQueue {
    /// Creates the queue and spawns its worker on the current Tokio runtime.
    ///
    /// The worker exits once the queue is dropped or the processor is gone.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(name: impl Into<String>, processor: Weak<dyn RequestProcessor>) -> Self {
        Self::spawn(name.into(), processor, true)
    }

    /// Like [`RequestQueue::new`], but every failure is delivered to its
    /// caller and the queue moves on; it never stalls.
    pub fn without_stalls(name: impl Into<String>, processor: Weak<dyn RequestProcessor>) -> Self {
        Self::spawn(name.into(), processor, false)
    }

    fn spawn(name: String, processor: Weak<dyn RequestProcessor>, stalls: bool) -> Self {
        let shared = Arc::new(Shared {
            name,
            stalls,
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                status: QueueStatus::Idle,
                skip_current: false,
                next_id: 1,
                closed: false,
            }),
            wake: Notify::new(),
        });
        tokio::spawn(run(Arc::clone(&shared), processor));
        Self { shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Appends a request and returns a future of its response.
    ///
    /// The entry is admitted before this returns; a stalled queue refuses it
    /// with [`SyncError::QueueStalled`].
    pub fn enqueue(&self, request: Request) -> BoxFuture<'static, SyncResult<Response>> {
        let mut state = self.shared.lock();
        if matches!(state.status, QueueStatus::Stalled { .. }) {
            let error = SyncError::QueueStalled {
                queue: self.shared.name.clone(),
            };
            return future::ready(Err(error)).boxed();
        }

        let id = state.next_id;
        state.next_id += 1;
        let (tx, rx) = oneshot::channel();
        debug!(queue = %self.shared.name, entry = id, request = request.name(), "enqueued");
        state.entries.push_back(Entry {
            id,
            request,
            responder: Some(tx),
        });
        drop(state);
        self.shared.wake.notify_one();
        receive(rx)
    }

    /// Discards the head entry without executing it.
    ///
    /// A stalled head is dropped and the queue resumes. An executing head
    /// cannot be interrupted; it is marked so that a failure discards it
    /// instead of stalling the queue. Returns false when there is nothing to
    /// skip.
    pub fn skip(&self) -> bool {
        let mut state = self.shared.lock();
        match state.status {
            QueueStatus::Processing(id) => {
                debug!(queue = %self.shared.name, entry = id, "skip requested while processing");
                state.skip_current = true;
                true
            }
            QueueStatus::Stalled { .. } | QueueStatus::Idle => {
                let Some(entry) = state.entries.pop_front() else {
                    return false;
                };
                state.status = QueueStatus::Idle;
                drop(state);
                debug!(queue = %self.shared.name, entry = entry.id, "skipped");
                if let Some(tx) = entry.responder {
                    let _ = tx.send(Err(self.shared.skipped()));
                }
                self.shared.wake.notify_one();
                true
            }
        }
    }

    /// Skips the stalled head if `pred` accepts its request.
    ///
    /// Lets the issuer of a failed request release the queue without
    /// discarding an entry that stalled it later.
    pub fn skip_stalled_if(&self, pred: impl FnOnce(&Request) -> bool) -> bool {
        let mut state = self.shared.lock();
        if !matches!(state.status, QueueStatus::Stalled { .. }) {
            return false;
        }
        if !state.entries.front().is_some_and(|e| pred(&e.request)) {
            return false;
        }
        let Some(entry) = state.entries.pop_front() else {
            return false;
        };
        state.status = QueueStatus::Idle;
        drop(state);
        debug!(queue = %self.shared.name, entry = entry.id, "stalled entry released by its issuer");
        if let Some(tx) = entry.responder {
            let _ = tx.send(Err(self.shared.skipped()));
        }
        self.shared.wake.notify_one();
        true
    }

    /// Re-executes a stalled head entry, returning its new result.
    pub fn retry(&self) -> Option<BoxFuture<'static, SyncResult<Response>>> {
        let mut state = self.shared.lock();
        let QueueStatus::Stalled { entry, .. } = state.status else {
            return None;
        };
        let (tx, rx) = oneshot::channel();
        if let Some(head) = state.entries.front_mut() {
            head.responder = Some(tx);
        }
        state.status = QueueStatus::Idle;
        drop(state);
        debug!(queue = %self.shared.name, entry, "retrying");
        self.shared.wake.notify_one();
        Some(receive(rx))
    }

    /// Discards every entry that is not executing. Returns how many.
    pub fn clear(&self) -> usize {
        let mut state = self.shared.lock();
        let keep = usize::from(matches!(state.status, QueueStatus::Processing(_)))
            .min(state.entries.len());
        let discarded: Vec<Entry> = state.entries.drain(keep..).collect();
        if matches!(state.status, QueueStatus::Stalled { .. }) {
            state.status = QueueStatus::Idle;
        }
        drop(state);
        let skipped = discarded.len();
        for entry in discarded {
            if let Some(tx) = entry.responder {
                let _ = tx.send(Err(self.shared.skipped()));
            }
        }
        if skipped > 0 {
            debug!(queue = %self.shared.name, skipped, "cleared");
        }
        skipped
    }

    pub fn status(&self) -> QueueStatus {
        self.shared.lock().status.clone()
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self.shared.lock().status, QueueStatus::Stalled { .. })
    }

    /// Number of entries, including the executing or stalled head.
    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().entries.is_empty()
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.shared.lock().closed = true;
        self.shared.wake.notify_one();
    }
}

fn receive(rx: oneshot::Receiver<SyncResult<Response>>) -> BoxFuture<'static, SyncResult<Response>> {
    async move { rx.await.unwrap_or(Err(SyncError::ChannelClosed)) }.boxed()
}

async fn run(shared: Arc<Shared>, processor: Weak<dyn RequestProcessor>) {
    loop {
        let next = {
            let mut state = shared.lock();
            if state.closed {
                break;
            }
            match (&state.status, state.entries.front()) {
                (QueueStatus::Idle, Some(entry)) => {
                    let picked = (entry.id, entry.request.clone());
                    state.status = QueueStatus::Processing(picked.0);
                    state.skip_current = false;
                    Some(picked)
                }
                _ => None,
            }
        };

        let Some((id, request)) = next else {
            shared.wake.notified().await;
            continue;
        };
        let Some(processor) = processor.upgrade() else {
            break;
        };

        debug!(queue = %shared.name, entry = id, request = request.name(), "processing");
        let result = processor.process(&request).await;
        drop(processor);
        shared.finish(id, result);
    }
    debug!(queue = %shared.name, "request queue worker stopped");
}
