//! # Metrics Collection
//!
//! Records configuration acquisition metrics through the `metrics` facade and
//! optionally exposes them with a Prometheus exporter. Without an installed
//! recorder every call is a no-op, so library code records unconditionally.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use crate::secrets::ErrorKind;
use crate::snapshot::SnapshotSource;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Records configuration acquisition metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record the outcome of a single network attempt.
    pub fn record_fetch_attempt(&self, outcome: Option<ErrorKind>) {
        let status = match outcome {
            None => "success".to_string(),
            Some(kind) => kind.to_string(),
        };
        counter!("cfgsync_fetch_attempts_total", "outcome" => status).increment(1);
    }

    /// Record a retry, including the backoff that precedes it
    pub fn record_retry(&self, delay_seconds: f64) {
        counter!("cfgsync_fetch_retries_total").increment(1);
        histogram!("cfgsync_fetch_backoff_seconds").record(delay_seconds);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        counter!("cfgsync_cache_lookups_total", "result" => result).increment(1);
    }

    pub fn record_stale_fallback(&self) {
        counter!("cfgsync_stale_cache_fallbacks_total").increment(1);
    }

    pub fn record_local_fallback(&self) {
        counter!("cfgsync_local_fallbacks_total").increment(1);
    }

    /// A remote fetch succeeded but returned no secrets at all.
    pub fn record_empty_fetch(&self) {
        counter!("cfgsync_remote_empty_fetches_total").increment(1);
    }

    pub fn record_fetch_duration(&self, seconds: f64) {
        histogram!("cfgsync_fetch_duration_seconds").record(seconds);
    }

    /// Record an initialize/refresh outcome.
    pub fn record_load(&self, operation: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!("cfgsync_loads_total", "operation" => operation.to_string(), "status" => status)
            .increment(1);
    }

    /// Update gauges describing the published snapshot.
    pub fn record_published(&self, count: usize, source: SnapshotSource) {
        gauge!("cfgsync_config_keys").set(count as f64);
        counter!("cfgsync_snapshots_published_total", "source" => source.to_string()).increment(1);
    }

    pub fn set_healthy(&self, healthy: bool) {
        gauge!("cfgsync_healthy").set(if healthy { 1.0 } else { 0.0 });
    }

    fn describe(&self) {
        describe_counter!("cfgsync_fetch_attempts_total", "Remote fetch attempts by outcome");
        describe_counter!("cfgsync_fetch_retries_total", "Remote fetch retries");
        describe_histogram!("cfgsync_fetch_backoff_seconds", "Backoff delay before a retry");
        describe_counter!("cfgsync_cache_lookups_total", "Fresh cache lookups by result");
        describe_counter!(
            "cfgsync_stale_cache_fallbacks_total",
            "Fetches answered from an expired cache entry"
        );
        describe_counter!("cfgsync_local_fallbacks_total", "Loads that fell back to local values");
        describe_counter!(
            "cfgsync_remote_empty_fetches_total",
            "Successful remote fetches that returned zero secrets"
        );
        describe_histogram!("cfgsync_fetch_duration_seconds", "Remote fetch wall time");
        describe_counter!("cfgsync_loads_total", "Initialize and refresh outcomes");
        describe_gauge!("cfgsync_config_keys", "Keys in the published snapshot");
        describe_counter!("cfgsync_snapshots_published_total", "Published snapshots by source");
        describe_gauge!("cfgsync_healthy", "1 when the last load did not need a fallback");
    }
}

/// Install the Prometheus exporter if metrics are enabled.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| {
            Error::observability(format!("Failed to initialize metrics exporter: {}", e))
        })?;

    MetricsRecorder::new().describe();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics exporter listening"
    );
    Ok(())
}
