// packages/dispatch/src/dispatcher/traits.rs
//! Dispatcher capability
//!
//! The framework delegates scheduling through [`Dispatcher`] without
//! knowing which strategy sits behind it. Strategies are identified by a
//! stable [`DispatcherKind`] id; instances are looked up by name in a
//! [`DispatcherRegistry`](crate::dispatcher::DispatcherRegistry).

use crate::dispatcher::agent::AgentRef;
use crate::dispatcher::binding::BindingHandle;
use crate::dispatcher::state::DispatcherState;
use crate::utils::errors::{DispatchError, Result};
use std::fmt;
use std::str::FromStr;

/// Scheduling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatcherKind {
    /// One dedicated worker thread serving every bound agent
    SingleThread,
}

impl DispatcherKind {
    /// Stable identifier
    pub fn id(&self) -> &'static str {
        match self {
            DispatcherKind::SingleThread => "one_thread",
        }
    }
}

impl fmt::Display for DispatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for DispatcherKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "one_thread" => Ok(DispatcherKind::SingleThread),
            other => Err(DispatchError::Config(format!(
                "unknown dispatcher kind '{}'",
                other
            ))),
        }
    }
}

/// Dispatcher statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Handlers run to completion (including failed ones)
    pub executed: u64,

    /// Handlers that returned an error or panicked
    pub failed: u64,

    /// Demands skipped because their agent was deactivated or discarded
    pub skipped: u64,

    /// Demands dropped by a discarding shutdown
    pub discarded: u64,

    /// Agents currently bound
    pub bound_agents: usize,

    /// Demands waiting in the queue
    pub queued: usize,
}

/// Operations the framework needs from a dispatcher
pub trait Dispatcher: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    fn kind(&self) -> DispatcherKind;

    fn state(&self) -> DispatcherState;

    /// Bind `agent` and return the handle used to enqueue its demands.
    ///
    /// Fails with `AlreadyBound` if the agent has a binding anywhere, and
    /// with `DispatcherStopped` once shutdown has begun.
    fn bind(&self, agent: &AgentRef) -> Result<BindingHandle>;

    /// Remove `agent`'s binding; further pushes through its handle fail
    fn unbind(&self, agent: &AgentRef) -> Result<()>;

    /// Start dispatching. No-op if already running.
    fn start(&self) -> Result<()>;

    /// Begin shutdown; with `wait`, block until the dispatcher is stopped
    fn shutdown(&self, wait: bool) -> Result<()>;

    /// Block until the dispatcher is stopped
    fn join(&self) -> Result<()>;

    fn stats(&self) -> DispatcherStats;
}
