//! # cfgsync
//!
//! Startup configuration for services that keep their secrets in a remote
//! secrets service but must still run from local `.env` files when that
//! service is unreachable.
//!
//! ## Architecture
//!
//! ```text
//! LocalEnvironmentLoader ──▶ RemoteSourceConfig ──▶ RemoteConfigClient ──▶ merge ──▶ validate ──▶ publish
//!   (.env files + process)     (access token)       (cache, retry, classify)
//! ```
//!
//! - **Acquisition** ([`secrets`]): remote fetch with bounded exponential
//!   backoff, a TTL cache that doubles as a stale fallback, and local `.env`
//!   layering.
//! - **Manager** ([`manager`]): single-flight initialization, validation,
//!   atomic snapshot publication, refresh, health and stats.
//! - **Observability** ([`observability`]): tracing, Prometheus metrics and
//!   health checks.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cfgsync::{ConfigManager, ManagerSettings, Result, ValidationRule};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = ConfigManager::builder()
//!         .settings(ManagerSettings::from_env()?)
//!         .rule(ValidationRule::required("DATABASE_URL"))
//!         .build();
//!
//!     manager.initialize().await?;
//!     let database_url = manager.get("DATABASE_URL")?;
//!     println!("{:?}", database_url);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod manager;
pub mod observability;
pub mod secrets;
pub mod snapshot;

// Re-export commonly used types and traits
pub use config::{ManagerSettings, ObservabilityConfig};
pub use errors::{Error, Result};
pub use manager::{
    ConfigManager, ConfigManagerBuilder, HealthReport, ManagerError, ManagerState, ManagerStats,
    ValidationReport, ValidationRule,
};
pub use secrets::{ConfigError, ErrorKind, RemoteSource, RemoteSourceConfig, RetryPolicy};
pub use snapshot::{ConfigSnapshot, SnapshotSource};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
