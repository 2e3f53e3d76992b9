// packages/dispatch/src/dispatcher/error_hook.rs
//! Framework error hook
//!
//! Handler failures are caught on the worker thread and reported here. The
//! hook decides what happens to the agent; whatever it does, the worker
//! keeps dispatching for everyone else.

use crate::dispatcher::agent::AgentRef;
use crate::utils::errors::HandlerExecutionError;
use tracing::warn;

/// What the dispatcher should do with an agent whose handler failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorReaction {
    /// Keep delivering to the agent
    #[default]
    Ignore,

    /// Skip the agent's remaining and future demands
    Deactivate,
}

/// Callback invoked with (agent, error) when a handler fails
pub trait ErrorHook: Send + Sync {
    /// Decide how to react to a failed handler.
    ///
    /// An `Err` (or a panic) from the hook is logged and treated as
    /// [`ErrorReaction::Ignore`].
    fn on_handler_error(
        &self,
        agent: &AgentRef,
        error: &HandlerExecutionError,
    ) -> anyhow::Result<ErrorReaction>;
}

/// Default hook: log and keep going
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHook;

impl ErrorHook for LoggingErrorHook {
    fn on_handler_error(
        &self,
        agent: &AgentRef,
        error: &HandlerExecutionError,
    ) -> anyhow::Result<ErrorReaction> {
        warn!(agent = %agent, agent_id = %agent.id(), "{}", error);
        Ok(ErrorReaction::Ignore)
    }
}

/// Hook backed by a closure
pub struct FnErrorHook<F>(F);

impl<F> FnErrorHook<F>
where
    F: Fn(&AgentRef, &HandlerExecutionError) -> anyhow::Result<ErrorReaction> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ErrorHook for FnErrorHook<F>
where
    F: Fn(&AgentRef, &HandlerExecutionError) -> anyhow::Result<ErrorReaction> + Send + Sync,
{
    fn on_handler_error(
        &self,
        agent: &AgentRef,
        error: &HandlerExecutionError,
    ) -> anyhow::Result<ErrorReaction> {
        (self.0)(agent, error)
    }
}
