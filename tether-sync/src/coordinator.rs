//! Owns the sources and the strategies that wire them together.

use crate::error::{SyncError, SyncResult};
use crate::handle::SourceHandle;
use crate::source::Source;
use crate::strategy::{Strategy, StrategyBinding};
use std::sync::Arc;
use tracing::{info, warn};

/// The sources a coordinator manages, by name.
#[derive(Debug, Default, Clone)]
pub struct SourceSet {
    handles: Vec<Arc<SourceHandle>>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> SyncResult<&Arc<SourceHandle>> {
        self.handles
            .iter()
            .find(|h| h.name() == name)
            .ok_or_else(|| SyncError::UnknownSource(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handles.iter().any(|h| h.name() == name)
    }

    pub fn insert(&mut self, handle: Arc<SourceHandle>) -> SyncResult<()> {
        if self.contains(handle.name()) {
            return Err(SyncError::Validation(format!(
                "duplicate source name: {}",
                handle.name()
            )));
        }
        self.handles.push(handle);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SourceHandle>> {
        self.handles.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Activates and deactivates a set of strategies over a set of sources.
///
/// Sources and strategies can only be added while the coordinator is
/// inactive. Dropping an active coordinator deactivates it.
#[derive(Default)]
pub struct Coordinator {
    sources: SourceSet,
    strategies: Vec<Box<dyn Strategy>>,
    /// Strategy indices in the order they were activated.
    activated: Vec<usize>,
    active: bool,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source` under `name` and starts its queues.
    pub fn add_source(&mut self, name: impl Into<String>, source: Arc<dyn Source>) -> SyncResult<Arc<SourceHandle>> {
        if self.active {
            return Err(SyncError::AlreadyActive);
        }
        let name = name.into();
        if self.sources.contains(&name) {
            return Err(SyncError::Validation(format!("duplicate source name: {name}")));
        }
        let handle = SourceHandle::new(name, source);
        self.sources.insert(Arc::clone(&handle))?;
        Ok(handle)
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) -> SyncResult<()> {
        if self.active {
            return Err(SyncError::AlreadyActive);
        }
        if self.strategies.iter().any(|s| s.name() == strategy.name()) {
            return Err(SyncError::InvalidStrategy(format!(
                "duplicate strategy name: {}",
                strategy.name()
            )));
        }
        self.strategies.push(strategy);
        Ok(())
    }

    pub fn source(&self, name: &str) -> SyncResult<&Arc<SourceHandle>> {
        self.sources.get(name)
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn strategies(&self) -> impl Iterator<Item = &dyn Strategy> {
        self.strategies.iter().map(|s| s.as_ref())
    }

    /// Every binding of every strategy, in declaration order.
    pub fn bindings(&self) -> Vec<StrategyBinding> {
        self.strategies.iter().flat_map(|s| s.bindings()).collect()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Installs every strategy's listeners, observability strategies first.
    ///
    /// If a strategy fails to activate, the ones already activated are
    /// deactivated again and the error is returned.
    pub fn activate(&mut self) -> SyncResult<()> {
        if self.active {
            return Err(SyncError::AlreadyActive);
        }
        let (mut order, rest): (Vec<usize>, Vec<usize>) =
            (0..self.strategies.len()).partition(|&i| self.strategies[i].kind().is_observability());
        order.extend(rest);

        for index in order {
            let strategy = &mut self.strategies[index];
            if let Err(error) = strategy.activate(&self.sources) {
                warn!(strategy = %strategy.name(), %error, "strategy activation failed, rolling back");
                self.rollback();
                return Err(error);
            }
            self.activated.push(index);
        }

        self.active = true;
        info!(
            sources = self.sources.len(),
            strategies = self.strategies.len(),
            "Coordinator activated"
        );
        Ok(())
    }

    /// Removes every listener, in reverse activation order.
    ///
    /// Entries already in a queue still run, without replication.
    pub fn deactivate(&mut self) -> SyncResult<()> {
        if !self.active {
            return Err(SyncError::NotActive);
        }
        self.rollback();
        self.active = false;
        info!("Coordinator deactivated");
        Ok(())
    }

    fn rollback(&mut self) {
        while let Some(index) = self.activated.pop() {
            self.strategies[index].deactivate();
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if self.active {
            self.rollback();
            self.active = false;
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("sources", &self.sources.names())
            .field("strategies", &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("active", &self.active)
            .finish()
    }
}
