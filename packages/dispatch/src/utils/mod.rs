// packages/dispatch/src/utils/mod.rs
//! Shared utilities: configuration and error types

pub mod config;
pub mod errors;

pub use self::config::{DispatcherConfig, ShutdownPolicy, UnbindPolicy};
pub use self::errors::{DispatchError, HandlerExecutionError, Result};
