//! # Observability Infrastructure
//!
//! Structured logging, Prometheus metrics and health reporting.

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{HealthCheck, HealthProvider, HealthStatus};
pub use logging::{init_logging, log_settings_info};
pub use metrics::{init_metrics, MetricsRecorder};

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging and, if enabled, the metrics exporter.
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;
    init_metrics(config)?;

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        metrics_enabled = %config.enable_metrics,
        "Observability initialized"
    );
    Ok(())
}
