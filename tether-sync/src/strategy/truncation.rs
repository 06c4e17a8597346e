//! Keeps transform logs from growing without bound.

use super::{BindingAction, Strategy, StrategyBinding, StrategyKind, Subscriptions};
use crate::coordinator::SourceSet;
use crate::error::SyncResult;
use crate::event::{EventKind, SourceEvent};
use crate::handle::SourceHandle;
use std::sync::{Arc, Weak};
use tether_types::TransformId;
use tracing::debug;

/// After every commit, drops the log entries that precede the most recent
/// transform every watched source has logged.
///
/// Handles recognise transforms they already applied through their logs.
/// Once an entry is truncated, its transform is no longer recognised: only
/// the common head and later transforms are. Truncation therefore suits
/// topologies that never deliver a transform again once every watched
/// source has it, such as the offline-first one.
pub struct LogTruncationStrategy {
    name: String,
    sources: Option<Vec<String>>,
    watched: Vec<String>,
    subscriptions: Subscriptions,
}

impl LogTruncationStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: None,
            watched: Vec::new(),
            subscriptions: Subscriptions::default(),
        }
    }

    pub fn sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }
}

/// Most recent id present in every log.
pub(crate) fn common_head(handles: &[Arc<SourceHandle>]) -> Option<TransformId> {
    let (first, rest) = handles.split_first()?;
    first
        .log()
        .entries()
        .into_iter()
        .rev()
        .find(|id| rest.iter().all(|h| h.log().contains(*id)))
}

impl Strategy for LogTruncationStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::LogTruncation
    }

    fn bindings(&self) -> Vec<StrategyBinding> {
        self.sources
            .as_ref()
            .unwrap_or(&self.watched)
            .iter()
            .map(|source| StrategyBinding {
                strategy: self.name.clone(),
                source: source.clone(),
                event: EventKind::Transform,
                target: None,
                action: BindingAction::Truncate,
                blocking: true,
                filtered: false,
                handles_errors: false,
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
        let weak: Arc<[Weak<SourceHandle>]> = handles.iter().map(Arc::downgrade).collect();

        for handle in &handles {
            let logs = Arc::clone(&weak);
            let listener = move |_: &SourceEvent| -> SyncResult<()> {
                let handles: Vec<Arc<SourceHandle>> = logs.iter().filter_map(Weak::upgrade).collect();
                if handles.len() != logs.len() {
                    return Ok(());
                }
                if let Some(id) = common_head(&handles) {
                    for handle in &handles {
                        handle.log().truncate(id);
                    }
                    debug!(transform = %id, "truncated transform logs");
                }
                Ok(())
            };
            self.subscriptions.on(handle, EventKind::Transform, Arc::new(listener));
        }
        self.watched = handles.iter().map(|h| h.name().to_string()).collect();
        Ok(())
    }

    fn deactivate(&mut self) {
        self.subscriptions.clear();
        self.watched.clear();
    }
}
