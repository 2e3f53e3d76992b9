// packages/dispatch/src/lib.rs
//! Custom Queue Dispatch Library
//!
//! A single-thread event-queue dispatcher for an actor framework. Agents
//! are bound to a dispatcher; every event handler of every bound agent runs
//! on the dispatcher's one worker thread, in the order the demands were
//! queued (or in the order a custom queue policy picks).
//!
//! # Architecture
//!
//! - **queue**: demands, ordering policies and the blocking MPSC queue
//! - **dispatcher**: agents, bindings, lifecycle, the single-thread
//!   dispatcher and the name registry
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and error types
//!
//! # Example
//!
//! ```no_run
//! use custom_queue_dispatch::{AgentRef, Dispatcher, DispatcherConfig, SingleThreadDispatcher};
//!
//! # fn main() -> custom_queue_dispatch::Result<()> {
//! let dispatcher = SingleThreadDispatcher::new(DispatcherConfig::named("one_thread"))?;
//! let agent = AgentRef::new("alice");
//!
//! let handle = dispatcher.bind(&agent)?;
//! dispatcher.start()?;
//! handle.push_start(|| {
//!     println!("alice started");
//!     Ok(())
//! })?;
//!
//! dispatcher.shutdown(true)?;
//! # Ok(())
//! # }
//! ```

// Public module exports
pub mod dispatcher;
pub mod observability;
pub mod queue;
pub mod utils;

// Re-export commonly used types
pub use dispatcher::{
    AgentRef, BindingHandle, Dispatcher, DispatcherKind, DispatcherRegistry, DispatcherState,
    DispatcherStats, ErrorHook, ErrorReaction, FnErrorHook, LoggingErrorHook, QueueBinder,
    SingleThreadDispatcher,
};
pub use queue::{
    AgentPriorities, BoundQueue, Demand, DemandKind, DemandQueue, FifoQueue, LaneId, Priority,
    PriorityQueue,
};
pub use utils::config::{DispatcherConfig, ShutdownPolicy, UnbindPolicy};
pub use utils::errors::{DispatchError, HandlerExecutionError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_kind_id() {
        assert_eq!(DispatcherKind::SingleThread.to_string(), DispatcherConfig::default().name);
    }
}
