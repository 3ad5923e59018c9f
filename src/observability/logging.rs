//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.
//!
//! `RUST_LOG` takes precedence over the configured level. Output goes to stderr
//! so command output on stdout stays machine-readable.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Create a tracing span for a configuration load (initialize or refresh).
///
/// ```rust,ignore
/// let span = load_span!("initialize", "production");
/// ```
#[macro_export]
macro_rules! load_span {
    ($operation:expr, $environment:expr) => {
        tracing::info_span!(
            "config_load",
            operation = %$operation,
            environment = %$environment
        )
    };
    ($operation:expr, $environment:expr, $($field:tt)*) => {
        tracing::info_span!(
            "config_load",
            operation = %$operation,
            environment = %$environment,
            $($field)*
        )
    };
}

/// Build the filter from `RUST_LOG`, or from the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(&config.log_level).map_err(|e| {
            Error::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config)?)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = if config.json_logging { builder.json().try_init() } else { builder.try_init() };

    result.map_err(|e| Error::observability(format!("Failed to initialize logging: {}", e)))
}

/// Log configuration at startup
pub fn log_settings_info(settings: &crate::config::ManagerSettings) {
    tracing::info!(
        base_url = %settings.base_url,
        environment = %settings.environment,
        config_dir = %settings.config_dir.display(),
        cache_enabled = settings.cache_enabled,
        cache_ttl_ms = settings.cache_ttl_ms,
        fallback_to_local = settings.fallback_to_local,
        max_attempts = settings.retry.max_attempts,
        "cfgsync configuration"
    );
}
