//! # Configuration Management
//!
//! Settings for the configuration manager itself and for observability, read
//! from `CFGSYNC_*` process variables.

pub mod settings;

pub use settings::{ManagerSettings, ObservabilityConfig, RetrySettings};
