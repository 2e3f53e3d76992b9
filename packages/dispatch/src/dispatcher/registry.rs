// packages/dispatch/src/dispatcher/registry.rs
//! Dispatcher registry
//!
//! Dispatchers register under a name so agents can ask to be bound to them
//! by that name. The registry is an explicit object handed to whoever needs
//! it; there is no process-wide instance.

use crate::dispatcher::agent::AgentRef;
use crate::dispatcher::binding::BindingHandle;
use crate::dispatcher::traits::{Dispatcher, DispatcherKind};
use crate::utils::errors::{DispatchError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name → dispatcher map
#[derive(Default)]
pub struct DispatcherRegistry {
    dispatchers: DashMap<String, Arc<dyn Dispatcher>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dispatcher under its own name
    pub fn register(&self, dispatcher: Arc<dyn Dispatcher>) -> Result<()> {
        let name = dispatcher.name().to_string();

        match self.dispatchers.entry(name.clone()) {
            Entry::Occupied(_) => Err(DispatchError::DuplicateDispatcher(name)),
            Entry::Vacant(slot) => {
                debug!(dispatcher = %name, kind = %dispatcher.kind(), "Dispatcher registered");
                slot.insert(dispatcher);
                Ok(())
            }
        }
    }

    /// Remove a dispatcher from the registry (it keeps running)
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Dispatcher>> {
        self.dispatchers.remove(name).map(|(_, d)| d)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Dispatcher>> {
        self.dispatchers.get(name).map(|d| Arc::clone(d.value()))
    }

    fn require(&self, name: &str) -> Result<Arc<dyn Dispatcher>> {
        self.get(name)
            .ok_or_else(|| DispatchError::UnknownDispatcher(name.to_string()))
    }

    /// Bind `agent` to the dispatcher registered as `name`
    pub fn bind(&self, name: &str, agent: &AgentRef) -> Result<BindingHandle> {
        self.require(name)?.bind(agent)
    }

    /// Unbind `agent` from the dispatcher registered as `name`
    pub fn unbind(&self, name: &str, agent: &AgentRef) -> Result<()> {
        self.require(name)?.unbind(agent)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dispatchers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Names of dispatchers using the given strategy, sorted
    pub fn names_of_kind(&self, kind: DispatcherKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .dispatchers
            .iter()
            .filter(|e| e.value().kind() == kind)
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Dispatcher>> {
        // Cloned out so no shard lock is held while dispatchers block
        self.dispatchers.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Start every registered dispatcher
    pub fn start_all(&self) -> Result<()> {
        for dispatcher in self.snapshot() {
            dispatcher.start()?;
        }
        Ok(())
    }

    /// Shut every registered dispatcher down.
    ///
    /// All are asked to stop before any is waited on. Returns the first
    /// error after trying every dispatcher.
    pub fn shutdown_all(&self, wait: bool) -> Result<()> {
        let dispatchers = self.snapshot();
        info!("Shutting down {} dispatchers", dispatchers.len());

        let mut first_error = None;

        for dispatcher in &dispatchers {
            if let Err(e) = dispatcher.shutdown(false) {
                warn!(dispatcher = %dispatcher.name(), "Shutdown failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if wait {
            for dispatcher in &dispatchers {
                if let Err(e) = dispatcher.join() {
                    warn!(dispatcher = %dispatcher.name(), "Join failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::single_thread::SingleThreadDispatcher;
    use crate::dispatcher::state::DispatcherState;
    use crate::utils::config::DispatcherConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_and_lookup() {
        let registry = DispatcherRegistry::new();
        let disp = SingleThreadDispatcher::create(&registry, DispatcherConfig::named("alpha")).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["alpha".to_string()]);
        assert_eq!(
            registry.names_of_kind(DispatcherKind::SingleThread),
            vec!["alpha".to_string()]
        );
        assert_eq!(registry.get("alpha").unwrap().name(), disp.name());
        assert!(registry.get("beta").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = DispatcherRegistry::new();
        SingleThreadDispatcher::create(&registry, DispatcherConfig::named("alpha")).unwrap();

        let err = SingleThreadDispatcher::create(&registry, DispatcherConfig::named("alpha")).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateDispatcher(ref n) if n == "alpha"));
    }

    #[test]
    fn test_bind_by_name() {
        let registry = DispatcherRegistry::new();
        SingleThreadDispatcher::create(&registry, DispatcherConfig::named("alpha")).unwrap();
        let agent = AgentRef::new("alice");
        let counter = Arc::new(AtomicUsize::new(0));

        assert!(matches!(
            registry.bind("missing", &agent),
            Err(DispatchError::UnknownDispatcher(_))
        ));

        let handle = registry.bind("alpha", &agent).unwrap();
        assert_eq!(handle.dispatcher(), "alpha");
        assert_eq!(agent.bound_dispatcher().as_deref(), Some("alpha"));

        registry.start_all().unwrap();
        {
            let counter = Arc::clone(&counter);
            handle
                .push_start(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        registry.unbind("alpha", &agent).unwrap();
        registry.shutdown_all(true).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(
            registry.get("alpha").unwrap().state(),
            DispatcherState::Stopped
        );
    }

    #[test]
    fn test_shutdown_all_stops_everything() {
        let registry = DispatcherRegistry::new();
        for name in ["a", "b", "c"] {
            SingleThreadDispatcher::create(&registry, DispatcherConfig::named(name)).unwrap();
        }

        registry.start_all().unwrap();
        registry.shutdown_all(true).unwrap();

        for name in registry.names() {
            assert_eq!(registry.get(&name).unwrap().state(), DispatcherState::Stopped);
        }
    }

    #[test]
    fn test_unregister() {
        let registry = DispatcherRegistry::new();
        SingleThreadDispatcher::create(&registry, DispatcherConfig::named("alpha")).unwrap();

        assert!(registry.unregister("alpha").is_some());
        assert!(registry.is_empty());
        assert!(registry.unregister("alpha").is_none());
    }
}
