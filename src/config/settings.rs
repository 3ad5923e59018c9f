//! # Configuration Settings
//!
//! Settings that control how configuration is acquired, read from `CFGSYNC_*`
//! process variables and validated with the `validator` crate.

use crate::errors::{Error, Result};
use crate::secrets::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Settings for [`ConfigManager`](crate::ConfigManager).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ManagerSettings {
    /// Remote secrets service base URL
    #[validate(length(min = 1, message = "Base URL cannot be empty"))]
    pub base_url: String,

    /// Environment name, selects `.env.<environment>`
    #[validate(length(min = 1, message = "Environment cannot be empty"))]
    pub environment: String,

    /// Directory holding the `.env*` files
    pub config_dir: PathBuf,

    /// Cache remote values between fetches
    pub cache_enabled: bool,

    /// Cache time-to-live in milliseconds
    #[validate(range(
        min = 1,
        max = 86_400_000,
        message = "Cache TTL must be between 1ms and 24 hours"
    ))]
    pub cache_ttl_ms: u64,

    /// Fall back to local values when the remote is unusable
    pub fallback_to_local: bool,

    /// Refresh in the background once the cache TTL has passed
    pub background_refresh: bool,

    /// Per-attempt deadline in milliseconds
    #[validate(range(
        min = 1,
        max = 300_000,
        message = "Request timeout must be between 1ms and 5 minutes"
    ))]
    pub request_timeout_ms: u64,

    /// Retry behaviour for remote fetches
    #[validate(nested)]
    pub retry: RetrySettings,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            environment: "development".to_string(),
            config_dir: PathBuf::from("."),
            cache_enabled: true,
            cache_ttl_ms: 300_000, // 5 minutes
            fallback_to_local: true,
            background_refresh: true,
            request_timeout_ms: 10_000,
            retry: RetrySettings::default(),
        }
    }
}

impl ManagerSettings {
    /// Read settings from process variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            base_url: lookup("CFGSYNC_BASE_URL").unwrap_or(defaults.base_url),
            environment: lookup("CFGSYNC_ENVIRONMENT").unwrap_or(defaults.environment),
            config_dir: lookup("CFGSYNC_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.config_dir),
            cache_enabled: parse_bool(&lookup, "CFGSYNC_CACHE_ENABLED", defaults.cache_enabled)?,
            cache_ttl_ms: parse_var(&lookup, "CFGSYNC_CACHE_TTL_MS", defaults.cache_ttl_ms)?,
            fallback_to_local: parse_bool(
                &lookup,
                "CFGSYNC_FALLBACK_TO_LOCAL",
                defaults.fallback_to_local,
            )?,
            background_refresh: parse_bool(
                &lookup,
                "CFGSYNC_BACKGROUND_REFRESH",
                defaults.background_refresh,
            )?,
            request_timeout_ms: parse_var(
                &lookup,
                "CFGSYNC_REQUEST_TIMEOUT_MS",
                defaults.request_timeout_ms,
            )?,
            retry: RetrySettings {
                max_attempts: parse_var(
                    &lookup,
                    "CFGSYNC_RETRY_MAX_ATTEMPTS",
                    defaults.retry.max_attempts,
                )?,
                base_delay_ms: parse_var(
                    &lookup,
                    "CFGSYNC_RETRY_BASE_DELAY_MS",
                    defaults.retry.base_delay_ms,
                )?,
                max_delay_ms: parse_var(
                    &lookup,
                    "CFGSYNC_RETRY_MAX_DELAY_MS",
                    defaults.retry.max_delay_ms,
                )?,
                backoff_multiplier: parse_var(
                    &lookup,
                    "CFGSYNC_RETRY_BACKOFF_MULTIPLIER",
                    defaults.retry.backoff_multiplier,
                )?,
            },
        })
    }

    /// Validate field ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(Error::config("Retry max delay cannot be smaller than the base delay"));
        }

        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
        }
    }
}

/// Retry settings, converted into a [`RetryPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetrySettings {
    #[validate(range(min = 1, max = 10, message = "Max attempts must be between 1 and 10"))]
    pub max_attempts: u32,

    pub base_delay_ms: u64,

    #[validate(range(max = 300_000, message = "Max delay cannot exceed 5 minutes"))]
    pub max_delay_ms: u64,

    #[validate(range(
        min = 1.0,
        max = 10.0,
        message = "Backoff multiplier must be between 1.0 and 10.0"
    ))]
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    /// Service name attached to metrics
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 0,
            service_name: "cfgsync".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let metrics_port = parse_var(&lookup, "CFGSYNC_METRICS_PORT", defaults.metrics_port)?;

        let config = Self {
            enable_metrics: metrics_port != 0,
            metrics_port,
            service_name: lookup("CFGSYNC_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("CFGSYNC_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: parse_bool(&lookup, "CFGSYNC_JSON_LOGGING", defaults.json_logging)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("Invalid {} '{}': {}", name, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, name: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::config(format!("Invalid {} '{}': expected a boolean", name, raw))),
        },
        None => Ok(default),
    }
}
