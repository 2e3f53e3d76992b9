// packages/dispatch/src/utils/config.rs
//! Dispatcher configuration
//!
//! Settings come from built-in defaults, an optional file, and environment
//! variables prefixed with `DISPATCH__` (e.g. `DISPATCH__UNBIND_POLICY=discard`),
//! in that order of precedence.

use crate::utils::errors::{DispatchError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file looked up by [`DispatcherConfig::load`]
pub const DEFAULT_CONFIG_FILE: &str = "dispatch.toml";

/// What happens to already-queued demands of an agent when it is unbound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnbindPolicy {
    /// Execute them before the binding disappears
    #[default]
    Drain,

    /// Skip them when the worker reaches them
    Discard,
}

/// What happens to queued demands when the dispatcher shuts down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Worker executes everything queued before closure, then exits
    #[default]
    Drain,

    /// Queue is cleared at shutdown; only the in-flight handler completes
    Discard,
}

/// Configuration for a single-thread dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Registry name (default: "one_thread")
    pub name: String,

    /// OS thread name of the worker (default: "dispatch-worker")
    pub thread_name: String,

    pub unbind_policy: UnbindPolicy,

    pub shutdown_policy: ShutdownPolicy,

    /// Handlers running longer than this are reported with a warning
    pub slow_demand_threshold_ms: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: "one_thread".to_string(),
            thread_name: "dispatch-worker".to_string(),
            unbind_policy: UnbindPolicy::Drain,
            shutdown_policy: ShutdownPolicy::Drain,
            slow_demand_threshold_ms: None,
        }
    }
}

impl DispatcherConfig {
    /// Create a default configuration with the given dispatcher name
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            thread_name: format!("dispatch-{}", name),
            name,
            ..Default::default()
        }
    }

    pub fn with_unbind_policy(mut self, policy: UnbindPolicy) -> Self {
        self.unbind_policy = policy;
        self
    }

    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    pub fn with_slow_demand_threshold(mut self, threshold: Duration) -> Self {
        self.slow_demand_threshold_ms = Some(threshold.as_millis() as u64);
        self
    }

    /// Load from `dispatch.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from the given file (if present) and the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("DISPATCH").separator("__"))
            .build()?;

        let config: DispatcherConfig = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Slow-handler threshold as a duration
    pub fn slow_demand_threshold(&self) -> Option<Duration> {
        self.slow_demand_threshold_ms.map(Duration::from_millis)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::Config("dispatcher name cannot be empty".into()));
        }

        if self.thread_name.is_empty() {
            return Err(DispatchError::Config("thread name cannot be empty".into()));
        }

        // std::thread::Builder panics on names with interior NULs
        if self.thread_name.contains('\0') {
            return Err(DispatchError::Config(
                "thread name cannot contain NUL bytes".into(),
            ));
        }

        if self.slow_demand_threshold_ms == Some(0) {
            return Err(DispatchError::Config(
                "slow demand threshold cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert_eq!(config.name, "one_thread");
        assert_eq!(config.unbind_policy, UnbindPolicy::Drain);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Drain);
        assert!(config.slow_demand_threshold().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_named_config() {
        let config = DispatcherConfig::named("io")
            .with_unbind_policy(UnbindPolicy::Discard)
            .with_slow_demand_threshold(Duration::from_millis(250));

        assert_eq!(config.name, "io");
        assert_eq!(config.thread_name, "dispatch-io");
        assert_eq!(config.unbind_policy, UnbindPolicy::Discard);
        assert_eq!(config.slow_demand_threshold(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_validation() {
        let empty_name = DispatcherConfig {
            name: "  ".into(),
            ..Default::default()
        };
        assert!(empty_name.validate().is_err());

        let bad_thread = DispatcherConfig {
            thread_name: "a\0b".into(),
            ..Default::default()
        };
        assert!(bad_thread.validate().is_err());

        let zero_threshold = DispatcherConfig {
            slow_demand_threshold_ms: Some(0),
            ..Default::default()
        };
        assert!(zero_threshold.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "name = \"from_file\"\nunbind_policy = \"discard\"\nshutdown_policy = \"discard\"\nslow_demand_threshold_ms = 50"
        )
        .unwrap();

        let config = DispatcherConfig::load_from(file.path()).unwrap();
        assert_eq!(config.name, "from_file");
        assert_eq!(config.thread_name, "dispatch-worker");
        assert_eq!(config.unbind_policy, UnbindPolicy::Discard);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Discard);
        assert_eq!(config.slow_demand_threshold_ms, Some(50));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DispatcherConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Drain);
    }

    #[test]
    fn test_environment_overrides_defaults() {
        // Other loaders here expect Discard or do not read this key
        std::env::set_var("DISPATCH__UNBIND_POLICY", "discard");
        let dir = tempfile::tempdir().unwrap();
        let loaded = DispatcherConfig::load_from(dir.path().join("absent.toml"));
        std::env::remove_var("DISPATCH__UNBIND_POLICY");

        let config = loaded.unwrap();
        assert_eq!(config.unbind_policy, UnbindPolicy::Discard);
        assert_eq!(config.name, "one_thread");
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "slow_demand_threshold_ms = 0").unwrap();

        let result = DispatcherConfig::load_from(file.path());
        assert!(matches!(result, Err(DispatchError::Config(_))));
    }
}
