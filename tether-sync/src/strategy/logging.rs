//! Logs source events.

use super::{BindingAction, Strategy, StrategyBinding, StrategyKind, Subscriptions};
use crate::coordinator::SourceSet;
use crate::error::SyncResult;
use crate::event::{EventKind, SourceEvent};
use std::sync::Arc;
use tracing::info;

/// Writes one `info` line per event, under the `tether_sync::events` target.
pub struct EventLoggingStrategy {
    name: String,
    sources: Option<Vec<String>>,
    events: Option<Vec<EventKind>>,
    watched: Vec<String>,
    subscriptions: Subscriptions,
}

impl EventLoggingStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: None,
            events: None,
            watched: Vec::new(),
            subscriptions: Subscriptions::default(),
        }
    }

    /// Only log events of these sources.
    pub fn sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    /// Only log these kinds of events.
    pub fn events(mut self, events: impl IntoIterator<Item = EventKind>) -> Self {
        self.events = Some(events.into_iter().collect());
        self
    }

    fn kinds(&self) -> Vec<EventKind> {
        self.events.clone().unwrap_or_else(|| EventKind::ALL.to_vec())
    }
}

impl Strategy for EventLoggingStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::EventLogging
    }

    /// Source rows are only known for all-source loggers once activated.
    fn bindings(&self) -> Vec<StrategyBinding> {
        let sources = self.sources.as_ref().unwrap_or(&self.watched);
        let kinds = self.kinds();
        sources
            .iter()
            .flat_map(|source| {
                kinds.iter().map(move |kind| StrategyBinding {
                    strategy: self.name.clone(),
                    source: source.clone(),
                    event: *kind,
                    target: None,
                    action: BindingAction::Log,
                    blocking: true,
                    filtered: false,
                    handles_errors: false,
                })
            })
            .collect()
    }

    fn activate(&mut self, sources: &SourceSet) -> SyncResult<()> {
        let handles = match &self.sources {
            Some(names) => names
                .iter()
                .map(|name| sources.get(name).cloned())
                .collect::<SyncResult<Vec<_>>>()?,
            None => sources.iter().cloned().collect(),
        };
        let kinds = self.kinds();
        for handle in &handles {
            for kind in &kinds {
                let source = handle.name().to_string();
                let listener = move |event: &SourceEvent| -> SyncResult<()> {
                    info!(
                        target: "tether_sync::events",
                        source = %source,
                        event = %event.kind(),
                        "{}",
                        event.summary()
                    );
                    Ok(())
                };
                self.subscriptions.on(handle, *kind, Arc::new(listener));
            }
        }
        self.watched = handles.iter().map(|h| h.name().to_string()).collect();
        Ok(())
    }

    fn deactivate(&mut self) {
        self.subscriptions.clear();
        self.watched.clear();
    }
}
