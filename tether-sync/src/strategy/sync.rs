//! Replicates committed transforms into another source.

use super::filter::RequestFilter;
use super::{BindingAction, Strategy, StrategyBinding, StrategyKind, Subscriptions, upgrade};
use crate::coordinator::SourceSet;
use crate::error::{SyncError, SyncResult};
use crate::event::{EventKind, Listener, SourceEvent};
use crate::handle::SourceHandle;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

/// Syncs every transform `source` commits into `target`.
///
/// The sync is admitted to the target's sync queue while the transform
/// event is being settled, so transforms reach each target in the order
/// they were committed. A blocking strategy also holds the commit's caller
/// until the sync has settled.
pub struct SyncStrategy {
    name: String,
    source: String,
    target: String,
    blocking: bool,
    filter: Option<Arc<dyn RequestFilter>>,
    subscriptions: Subscriptions,
}

impl SyncStrategy {
    pub fn new(name: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            blocking: false,
            filter: None,
            subscriptions: Subscriptions::default(),
        }
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn filter(mut self, filter: impl RequestFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl Strategy for SyncStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Sync
    }

    fn bindings(&self) -> Vec<StrategyBinding> {
        vec![StrategyBinding {
            strategy: self.name.clone(),
            source: self.source.clone(),
            event: EventKind::Transform,
            target: Some(self.target.clone()),
            action: BindingAction::Sync,
            blocking: self.blocking,
            filtered: self.filter.is_some(),
            handles_errors: false,
        }]
    }

    fn activate(&mut self, sources: &SourceSet) -> SyncResult<()> {
        if !self.subscriptions.is_empty() {
            return Err(SyncError::InvalidStrategy(format!("{} is already active", self.name)));
        }
        let source = sources.get(&self.source)?;
        let target = sources.get(&self.target)?;
        if !target.capabilities().syncable {
            return Err(SyncError::InvalidStrategy(format!(
                "{}: {} does not support sync",
                self.name, self.target
            )));
        }

        let listener = SyncListener {
            strategy: self.name.clone(),
            target: Arc::downgrade(target),
            target_name: self.target.clone(),
            blocking: self.blocking,
            filter: self.filter.clone(),
        };
        self.subscriptions.on(source, EventKind::Transform, Arc::new(listener));
        info!(
            strategy = %self.name,
            "{} transform -> {} sync (blocking: {})",
            self.source, self.target, self.blocking
        );
        Ok(())
    }

    fn deactivate(&mut self) {
        self.subscriptions.clear();
    }
}

struct SyncListener {
    strategy: String,
    target: Weak<SourceHandle>,
    target_name: String,
    blocking: bool,
    filter: Option<Arc<dyn RequestFilter>>,
}

#[async_trait]
impl Listener for SyncListener {
    async fn on_event(&self, event: &SourceEvent) -> SyncResult<()> {
        let Some(transform) = event.transform() else {
            return Ok(());
        };
        if let Some(filter) = &self.filter {
            if !filter.should_forward(event) {
                return Ok(());
            }
        }
        let target = upgrade(&self.target, &self.target_name)?;
        let sync = target.sync(transform.clone());
        if self.blocking {
            return sync.await;
        }

        let strategy = self.strategy.clone();
        let id = transform.id();
        tokio::spawn(async move {
            if let Err(error) = sync.await {
                warn!(%strategy, transform = %id, %error, "sync failed");
            }
        });
        Ok(())
    }
}
