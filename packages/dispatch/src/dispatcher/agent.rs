// packages/dispatch/src/dispatcher/agent.rs
//! Agent references
//!
//! The actor framework owns agents; the dispatcher only needs an identity
//! to key bindings on and a slot recording which dispatcher (if any) the
//! agent is currently bound to. The slot lives with the agent so a second
//! binding is refused no matter which dispatcher it is attempted on.

use crate::utils::errors::{DispatchError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use ulid::Ulid;

struct AgentInner {
    id: Ulid,
    name: String,
    bound_to: Mutex<Option<String>>,
}

/// Cheap, clonable reference to an agent
#[derive(Clone)]
pub struct AgentRef {
    inner: Arc<AgentInner>,
}

impl AgentRef {
    /// Create a reference for a new agent
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                id: Ulid::new(),
                name: name.into(),
                bound_to: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Ulid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Name of the dispatcher this agent is bound to, if any
    pub fn bound_dispatcher(&self) -> Option<String> {
        self.inner.bound_to.lock().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.inner.bound_to.lock().is_some()
    }

    /// Record a binding to `dispatcher`, failing if one already exists
    pub(crate) fn claim_binding(&self, dispatcher: &str) -> Result<()> {
        let mut slot = self.inner.bound_to.lock();

        if let Some(existing) = slot.as_ref() {
            return Err(DispatchError::AlreadyBound {
                agent: self.inner.name.clone(),
                dispatcher: existing.clone(),
            });
        }

        *slot = Some(dispatcher.to_string());
        Ok(())
    }

    /// Clear the binding slot if it points at `dispatcher`
    pub(crate) fn release_binding(&self, dispatcher: &str) -> bool {
        let mut slot = self.inner.bound_to.lock();

        if slot.as_deref() == Some(dispatcher) {
            *slot = None;
            true
        } else {
            false
        }
    }
}

impl PartialEq for AgentRef {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for AgentRef {}

impl Hash for AgentRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRef")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

impl fmt::Display for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let alice = AgentRef::new("alice");
        let other_alice = AgentRef::new("alice");

        assert_eq!(alice, alice.clone());
        assert_ne!(alice, other_alice);
        assert_eq!(alice.to_string(), "alice");
    }

    #[test]
    fn test_binding_slot() {
        let agent = AgentRef::new("bob");
        assert!(!agent.is_bound());

        agent.claim_binding("one").unwrap();
        assert_eq!(agent.bound_dispatcher().as_deref(), Some("one"));

        let err = agent.claim_binding("two").unwrap_err();
        assert!(matches!(
            err,
            DispatchError::AlreadyBound { ref dispatcher, .. } if dispatcher == "one"
        ));

        // Only the owning dispatcher may release
        assert!(!agent.release_binding("two"));
        assert!(agent.release_binding("one"));
        assert!(!agent.is_bound());
    }

    #[test]
    fn test_slot_shared_between_clones() {
        let agent = AgentRef::new("carol");
        let clone = agent.clone();

        agent.claim_binding("one").unwrap();
        assert!(clone.claim_binding("one").is_err());
    }
}
