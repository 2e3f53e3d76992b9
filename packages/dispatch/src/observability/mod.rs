// packages/dispatch/src/observability/mod.rs
//! Observability
//!
//! Process-wide tracing and metrics setup. Library code only emits events
//! (`tracing` macros, `metrics` counters); installing subscribers and
//! recorders is left to the binary.
//!
//! # Metrics
//!
//! ```text
//! dispatch_demands_executed_total{dispatcher}   handlers run
//! dispatch_demands_failed_total{dispatcher}     handlers that errored or panicked
//! dispatch_demands_skipped_total{dispatcher}    demands of unbound/deactivated agents
//! ```

use anyhow::{anyhow, Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// Environment variable selecting the log format (`json` or text)
pub const LOG_FORMAT_ENV: &str = "DISPATCH_LOG_FORMAT";

const DEFAULT_FILTER: &str = "info";

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` (default `info`). Set
/// `DISPATCH_LOG_FORMAT=json` for one JSON object per event.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

/// Install the Prometheus metrics recorder.
///
/// No HTTP listener is started; render snapshots through the returned handle.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_only_once() {
        let _ = init_tracing();
        assert!(init_tracing().is_err());
    }

    #[test]
    fn test_init_metrics_renders_counters() {
        let handle = init_metrics().unwrap();
        metrics::counter!("dispatch_observability_test_total", "dispatcher" => "test").increment(2);

        let rendered = handle.render();
        assert!(rendered.contains("dispatch_observability_test_total"));
    }
}
