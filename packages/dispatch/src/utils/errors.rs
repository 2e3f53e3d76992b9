// packages/dispatch/src/utils/errors.rs
//! Error types for the dispatcher
//!
//! Binding and lifecycle errors are returned synchronously to whoever made
//! the call. Handler failures never travel back to the producer; they are
//! wrapped in [`HandlerExecutionError`] at the worker boundary and routed to
//! the error hook.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors produced by queues, dispatchers and the registry
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The agent already has an active binding
    #[error("agent '{agent}' is already bound to dispatcher '{dispatcher}'")]
    AlreadyBound { agent: String, dispatcher: String },

    /// The agent has no binding on this dispatcher
    #[error("agent '{agent}' is not bound to dispatcher '{dispatcher}'")]
    NotBound { agent: String, dispatcher: String },

    /// Operation attempted while shutting down or after stop
    #[error("dispatcher '{0}' is shutting down or stopped")]
    DispatcherStopped(String),

    /// Push after close. Correct framework usage never hits this.
    #[error("queue is closed")]
    QueueClosed,

    #[error(transparent)]
    HandlerExecution(#[from] HandlerExecutionError),

    #[error("dispatcher '{0}' is already registered")]
    DuplicateDispatcher(String),

    #[error("dispatcher '{0}' is not registered")]
    UnknownDispatcher(String),

    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("worker thread of dispatcher '{0}' panicked")]
    WorkerPanicked(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for DispatchError {
    fn from(err: config::ConfigError) -> Self {
        DispatchError::Config(err.to_string())
    }
}

/// Failure raised by an agent's event handler
#[derive(Debug, Error)]
pub enum HandlerExecutionError {
    /// The handler returned an error
    #[error("handler of agent '{agent}' failed: {source:#}")]
    Failed {
        agent: String,
        #[source]
        source: anyhow::Error,
    },

    /// The handler panicked
    #[error("handler of agent '{agent}' panicked: {message}")]
    Panicked { agent: String, message: String },
}

impl HandlerExecutionError {
    /// Name of the agent whose handler failed
    pub fn agent(&self) -> &str {
        match self {
            HandlerExecutionError::Failed { agent, .. } => agent,
            HandlerExecutionError::Panicked { agent, .. } => agent,
        }
    }

    /// Build from a `catch_unwind` payload
    pub(crate) fn from_panic(agent: &str, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        HandlerExecutionError::Panicked {
            agent: agent.to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DispatchError::AlreadyBound {
            agent: "alice".into(),
            dispatcher: "one".into(),
        };
        assert_eq!(
            err.to_string(),
            "agent 'alice' is already bound to dispatcher 'one'"
        );

        assert_eq!(DispatchError::QueueClosed.to_string(), "queue is closed");
    }

    #[test]
    fn test_panic_payloads() {
        let err = HandlerExecutionError::from_panic("bob", Box::new("boom"));
        assert_eq!(err.agent(), "bob");
        assert!(err.to_string().contains("boom"));

        let err = HandlerExecutionError::from_panic("bob", Box::new(String::from("owned")));
        assert!(err.to_string().contains("owned"));

        let err = HandlerExecutionError::from_panic("bob", Box::new(42_u32));
        assert!(err.to_string().contains("non-string"));
    }

    #[test]
    fn test_handler_error_is_transparent() {
        let inner = HandlerExecutionError::Failed {
            agent: "carol".into(),
            source: anyhow::anyhow!("bad input"),
        };
        let err: DispatchError = inner.into();
        assert!(err.to_string().contains("bad input"));
        assert!(matches!(err, DispatchError::HandlerExecution(_)));
    }
}
