// packages/dispatch/src/dispatcher/mod.rs
//! Dispatchers
//!
//! This module provides the scheduling side of the crate:
//!
//! - **Agent**: agent identity and binding slot
//! - **Binding**: the per-agent handle producers push demands through
//! - **Error Hook**: where handler failures are reported
//! - **State**: the `created → running → shutting-down → stopped` lifecycle
//! - **Traits**: the `Dispatcher` capability the framework delegates to
//! - **Single Thread**: one worker thread serving every bound agent
//! - **Registry**: name → dispatcher lookup for bind-by-name
//!
//! # Architecture
//!
//! ```text
//! DispatcherRegistry
//! └─ "one_thread" ─▶ SingleThreadDispatcher
//!                    ├─ BoundQueue (one lane per binder, shared by its bindings)
//!                    ├─ bindings: { agent ─▶ BindingState }
//!                    └─ worker thread ── executes ──▶ agent handlers
//! ```

pub mod agent;
pub mod binding;
pub mod error_hook;
pub mod registry;
pub mod single_thread;
pub mod state;
pub mod traits;

// Re-export commonly used types
pub use agent::AgentRef;
pub use binding::{BindingHandle, SkipReason};
pub use error_hook::{ErrorHook, ErrorReaction, FnErrorHook, LoggingErrorHook};
pub use registry::DispatcherRegistry;
pub use single_thread::{QueueBinder, SingleThreadDispatcher, SingleThreadDispatcherBuilder};
pub use state::DispatcherState;
pub use traits::{Dispatcher, DispatcherKind, DispatcherStats};
