//! Forwards a source's requests to another source.

use super::filter::{ErrorHandler, FailureContext, RequestFilter};
use super::{BindingAction, Strategy, StrategyBinding, StrategyKind, Subscriptions, upgrade};
use crate::coordinator::SourceSet;
use crate::error::{SyncError, SyncResult};
use crate::event::{EventKind, Listener, SourceEvent};
use crate::handle::SourceHandle;
use crate::queue::Request;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// What is issued on the target when the event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    /// `pull` the event's query.
    Pull,
    /// `push` the event's transform.
    Push,
}

impl RequestAction {
    fn binding(self) -> BindingAction {
        match self {
            Self::Pull => BindingAction::Pull,
            Self::Push => BindingAction::Push,
        }
    }
}

/// On `on` events of `source`, issues `action` on `target`.
///
/// A blocking strategy holds the originating request until the forward
/// settles, and a failed forward fails the originating request (after the
/// error handler, if any). A non-blocking strategy admits the forward to
/// the target queue and lets it run on its own; a failed forward that
/// stalled the target queue is released from it, so later forwards still
/// reach the target.
pub struct RequestStrategy {
    name: String,
    source: String,
    on: EventKind,
    target: String,
    action: RequestAction,
    blocking: bool,
    filter: Option<Arc<dyn RequestFilter>>,
    handler: Option<Arc<dyn ErrorHandler>>,
    subscriptions: Subscriptions,
}

impl RequestStrategy {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        on: EventKind,
        target: impl Into<String>,
        action: RequestAction,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            on,
            target: target.into(),
            action,
            blocking: false,
            filter: None,
            handler: None,
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

    /// Error handler for failed blocking forwards.
    pub fn catch(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    fn check(&self, target: &SourceHandle) -> SyncResult<()> {
        let capabilities = target.capabilities();
        let (event_ok, target_ok, capability) = match self.action {
            RequestAction::Pull => (self.on.carries_query(), capabilities.pullable, "pull"),
            RequestAction::Push => (self.on.carries_transform(), capabilities.pushable, "push"),
        };
        if !event_ok {
            return Err(SyncError::InvalidStrategy(format!(
                "{}: {} events cannot be forwarded as {capability}",
                self.name, self.on
            )));
        }
        if !target_ok {
            return Err(SyncError::InvalidStrategy(format!(
                "{}: {} does not support {capability}",
                self.name, self.target
            )));
        }
        Ok(())
    }
}

impl Strategy for RequestStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Request
    }

    fn bindings(&self) -> Vec<StrategyBinding> {
        vec![StrategyBinding {
            strategy: self.name.clone(),
            source: self.source.clone(),
            event: self.on,
            target: Some(self.target.clone()),
            action: self.action.binding(),
            blocking: self.blocking,
            filtered: self.filter.is_some(),
            handles_errors: self.handler.is_some(),
        }]
    }

    fn activate(&mut self, sources: &SourceSet) -> SyncResult<()> {
        if !self.subscriptions.is_empty() {
            return Err(SyncError::InvalidStrategy(format!("{} is already active", self.name)));
        }
        let source = sources.get(&self.source)?;
        let target = sources.get(&self.target)?;
        self.check(target)?;

        let listener = ForwardListener {
            strategy: self.name.clone(),
            source: Arc::downgrade(source),
            source_name: self.source.clone(),
            target: Arc::downgrade(target),
            target_name: self.target.clone(),
            action: self.action,
            blocking: self.blocking,
            filter: self.filter.clone(),
            handler: self.handler.clone(),
        };
        self.subscriptions.on(source, self.on, Arc::new(listener));
        info!(
            strategy = %self.name,
            "{} {} -> {} {:?} (blocking: {})",
            self.source, self.on, self.target, self.action, self.blocking
        );
        Ok(())
    }

    fn deactivate(&mut self) {
        self.subscriptions.clear();
    }
}

struct ForwardListener {
    strategy: String,
    source: Weak<SourceHandle>,
    source_name: String,
    target: Weak<SourceHandle>,
    target_name: String,
    action: RequestAction,
    blocking: bool,
    filter: Option<Arc<dyn RequestFilter>>,
    handler: Option<Arc<dyn ErrorHandler>>,
}

impl ForwardListener {
    fn failed(&self, event: &SourceEvent, target: Arc<SourceHandle>, error: SyncError) -> SyncResult<()> {
        if let Some(filter) = &self.filter {
            filter.forward_failed(event, &error);
        }
        let Some(handler) = &self.handler else {
            return Err(error);
        };
        let context = FailureContext {
            strategy: self.strategy.clone(),
            source: upgrade(&self.source, &self.source_name)?,
            target,
            event: event.clone(),
        };
        handler.handle(&context, error)
    }
}

#[async_trait]
impl Listener for ForwardListener {
    async fn on_event(&self, event: &SourceEvent) -> SyncResult<()> {
        if let Some(filter) = &self.filter {
            if !filter.should_forward(event) {
                return Ok(());
            }
        }
        let target = upgrade(&self.target, &self.target_name)?;
        let forward = match (self.action, event.query(), event.transform()) {
            (RequestAction::Pull, Some(query), _) => target.pull(query.clone()),
            (RequestAction::Push, _, Some(transform)) => target.push(transform.clone()),
            _ => return Ok(()),
        };
        debug!(
            strategy = %self.strategy,
            event = %event.kind(),
            target = %self.target_name,
            blocking = self.blocking,
            "forwarding"
        );

        if self.blocking {
            return match forward.await {
                Ok(_) => Ok(()),
                Err(error) => self.failed(event, target, error),
            };
        }

        let strategy = self.strategy.clone();
        let action = self.action;
        let filter = self.filter.clone();
        let event = event.clone();
        tokio::spawn(async move {
            let Err(error) = forward.await else {
                return;
            };
            warn!(%strategy, %error, "forwarded request failed");
            if error.halts_queue()
                && target
                    .request_queue()
                    .skip_stalled_if(|request| issued_by(action, &event, request))
            {
                debug!(%strategy, target = %target.name(), "released target queue");
            }
            if let Some(filter) = filter {
                filter.forward_failed(&event, &error);
            }
        });
        Ok(())
    }
}

/// Whether `request` is the forward of `event`.
fn issued_by(action: RequestAction, event: &SourceEvent, request: &Request) -> bool {
    match (action, request) {
        (RequestAction::Pull, Request::Pull(query)) => event.query() == Some(query),
        (RequestAction::Push, Request::Push(transform)) => {
            event.transform().is_some_and(|t| t.id() == transform.id())
        }
        _ => false,
    }
}
