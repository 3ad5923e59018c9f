//! # Error Handling
//!
//! Crate-level error type used by settings, observability setup and the CLI.
//! Acquisition failures keep their own [`ConfigError`](crate::secrets::ConfigError)
//! and manager failures their own [`ManagerError`]; both convert into [`Error`].

use crate::manager::ManagerError;

/// Custom result type for cfgsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cfgsync
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Logging or metrics setup failures
    #[error("Observability error: {0}")]
    Observability(String),

    /// Configuration manager errors
    #[error(transparent)]
    Manager(#[from] ManagerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new observability error
    pub fn observability<S: Into<String>>(message: S) -> Self {
        Self::Observability(message.into())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Config(format!("Validation failed: {}", errors))
    }
}
