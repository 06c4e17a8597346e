#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_sync::{
    Capabilities, EventKind, KeyMap, MemorySource, Query, QueryResult, Record, Schema,
    SourceEvent, SourceHandle, Source, SyncError, SyncResult, Transform,
};
use tracing_subscriber::EnvFilter;

pub const DESCRIPTOR: &str = r#"{
  "models": {
    "article": {
      "attributes": {
        "title": {"type": "string"},
        "slug": {"type": "string"},
        "favoritesCount": {"type": "number"},
        "createdAt": {"type": "datetime"}
      },
      "relationships": {
        "author": {"type": "hasOne", "model": "profile", "inverse": "articles"},
        "comments": {"type": "hasMany", "model": "comment"}
      }
    },
    "profile": {
      "attributes": {"username": {"type": "string"}},
      "relationships": {
        "articles": {"type": "hasMany", "model": "article", "inverse": "author"}
      }
    },
    "comment": {
      "attributes": {"body": {"type": "string"}}
    }
  }
}"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::from_json(DESCRIPTOR)
            .unwrap()
            .with_read_only_attributes(["createdAt"]),
    )
}

pub fn memory() -> Arc<MemorySource> {
    Arc::new(MemorySource::new(schema(), Arc::new(KeyMap::new())))
}

pub fn article(id: &str, title: &str) -> Record {
    Record::new("article", id).with_attribute("title", title)
}

pub fn profile(id: &str, username: &str) -> Record {
    Record::new("profile", id).with_attribute("username", username)
}

/// Records the names of `kinds` events fired by `handle`, in order.
pub fn record_events(handle: &SourceHandle, kinds: &[EventKind]) -> Arc<Mutex<Vec<&'static str>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let seen = Arc::clone(&seen);
        let listener = move |event: &SourceEvent| -> SyncResult<()> {
            seen.lock().unwrap().push(event.kind().name());
            Ok(())
        };
        handle.events().on(*kind, Arc::new(listener));
    }
    seen
}

/// Ids of the transforms `handle` announces, in order.
pub fn record_transforms(handle: &SourceHandle) -> Arc<Mutex<Vec<Transform>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = move |event: &SourceEvent| -> SyncResult<()> {
        if let Some(transform) = event.transform() {
            sink.lock().unwrap().push(transform.clone());
        }
        Ok(())
    };
    handle.events().on(EventKind::Transform, Arc::new(listener));
    seen
}

/// One scripted call: how long it takes and whether it fails.
#[derive(Debug, Default)]
pub struct Step {
    pub delay: Duration,
    pub error: Option<SyncError>,
}

/// A source whose calls follow a script and are logged as
/// `"start <request> <subject>"` / `"end <request> <subject>"`.
///
/// The subject is the record type of a query or the id of a transform's
/// first record. Calls beyond the script succeed at once.
pub struct ScriptedSource {
    capabilities: Capabilities,
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::ALL)
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            steps: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn then(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn then_delay(&self, delay: Duration) {
        self.then(Step { delay, error: None });
    }

    pub fn then_fail(&self, error: SyncError) {
        self.then(Step {
            delay: Duration::ZERO,
            error: Some(error),
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Most calls ever running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    async fn run(&self, label: String) -> SyncResult<()> {
        let step = self.steps.lock().unwrap().pop_front().unwrap_or_default();
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        self.calls.lock().unwrap().push(format!("start {label}"));

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        self.calls.lock().unwrap().push(format!("end {label}"));
        self.running.fetch_sub(1, Ordering::SeqCst);
        step.error.map_or(Ok(()), Err)
    }
}

fn query_label(request: &str, query: &Query) -> String {
    format!("{request} {}", query.expression.record_type().unwrap_or("*"))
}

fn transform_label(request: &str, transform: &Transform) -> String {
    let subject = transform
        .operations()
        .first()
        .map(|op| op.identity().id.to_string())
        .unwrap_or_default();
    format!("{request} {subject}")
}

#[async_trait]
impl Source for ScriptedSource {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn query(&self, query: &Query) -> SyncResult<QueryResult> {
        self.run(query_label("query", query)).await?;
        Ok(QueryResult::Collection(Vec::new()))
    }

    async fn update(&self, transform: &Transform) -> SyncResult<Vec<Transform>> {
        self.run(transform_label("update", transform)).await?;
        Ok(vec![transform.clone()])
    }

    async fn pull(&self, query: &Query) -> SyncResult<Vec<Transform>> {
        self.run(query_label("pull", query)).await?;
        Ok(Vec::new())
    }

    async fn push(&self, transform: &Transform) -> SyncResult<Vec<Transform>> {
        self.run(transform_label("push", transform)).await?;
        Ok(vec![transform.clone()])
    }

    async fn sync(&self, transform: &Transform) -> SyncResult<()> {
        self.run(transform_label("sync", transform)).await
    }
}
