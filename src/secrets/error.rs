//! Error types for configuration acquisition.
//!
//! Every failure that can happen while talking to the remote secrets service
//! is reduced to a [`ConfigError`] by [`classify`]. The classification decides
//! whether [`RemoteConfigClient`](super::RemoteConfigClient) retries and whether a
//! stale cache entry may stand in for a fresh fetch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type for acquisition operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Category of a configuration acquisition failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Network,
    Timeout,
    RateLimit,
    ServerError,
    Validation,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Authentication => write!(f, "authentication"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::RateLimit => write!(f, "rate_limit"),
            ErrorKind::ServerError => write!(f, "server_error"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Typed configuration error with a retryability flag.
///
/// Immutable once produced. Cheap to clone so it can be kept as the manager's
/// `last_error` and handed to every waiter of a shared initialization.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{kind} error: {message}")]
pub struct ConfigError {
    pub kind: ErrorKind,
    pub http_status: Option<u16>,
    pub retryable: bool,
    pub occurred_at: DateTime<Utc>,
    pub message: String,
}

impl ConfigError {
    /// Create an error of the given kind, stamped with the current time.
    pub fn new(kind: ErrorKind, retryable: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            http_status: None,
            retryable,
            occurred_at: Utc::now(),
            message: message.into(),
        }
    }

    /// Attach the HTTP status that caused this error.
    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Create a validation error. Never retryable.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, false, message)
    }

    /// Create an unknown, non-retryable error for local failures.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, false, message)
    }
}

/// Low-level transport failure observed before any HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// Host name could not be resolved.
    NameResolution(String),
    /// Connection refused or otherwise could not be established.
    ConnectionRefused(String),
    /// The per-attempt deadline elapsed.
    DeadlineExceeded(String),
    /// Anything else the transport reported.
    Other(String),
}

impl From<&reqwest::Error> for TransportFailure {
    fn from(err: &reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            TransportFailure::DeadlineExceeded(message)
        } else if err.is_connect() {
            // reqwest surfaces DNS failures as connect errors; the source chain says which
            let chain = error_chain(err);
            if chain.contains("dns") || chain.contains("resolve") || chain.contains("lookup") {
                TransportFailure::NameResolution(message)
            } else {
                TransportFailure::ConnectionRefused(message)
            }
        } else if err.is_request() && !err.is_builder() {
            TransportFailure::ConnectionRefused(message)
        } else {
            TransportFailure::Other(message)
        }
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = err.to_string().to_lowercase();
    let mut source = err.source();
    while let Some(inner) = source {
        chain.push_str(": ");
        chain.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }
    chain
}

/// Raw outcome of a failed fetch attempt, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The request never produced an HTTP response.
    Transport(TransportFailure),
    /// The service answered with a non-2xx status.
    Status(u16),
    /// The response (or something local) could not be processed.
    Malformed(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Transport(TransportFailure::NameResolution(m)) => {
                write!(f, "name resolution failed: {}", m)
            }
            FetchFailure::Transport(TransportFailure::ConnectionRefused(m)) => {
                write!(f, "connection failed: {}", m)
            }
            FetchFailure::Transport(TransportFailure::DeadlineExceeded(m)) => {
                write!(f, "request aborted by deadline: {}", m)
            }
            FetchFailure::Transport(TransportFailure::Other(m)) => {
                write!(f, "transport error: {}", m)
            }
            FetchFailure::Status(status) => write!(f, "remote service returned HTTP {}", status),
            FetchFailure::Malformed(m) => write!(f, "malformed response: {}", m),
        }
    }
}

/// Map a raw fetch failure to a typed [`ConfigError`].
///
/// Pure function: no logging, no side effects.
pub fn classify(failure: &FetchFailure) -> ConfigError {
    let message = failure.to_string();
    match failure {
        FetchFailure::Transport(TransportFailure::NameResolution(_))
        | FetchFailure::Transport(TransportFailure::ConnectionRefused(_)) => {
            ConfigError::new(ErrorKind::Network, true, message)
        }
        FetchFailure::Transport(TransportFailure::DeadlineExceeded(_)) => {
            ConfigError::new(ErrorKind::Timeout, true, message)
        }
        FetchFailure::Transport(TransportFailure::Other(_)) | FetchFailure::Malformed(_) => {
            ConfigError::unknown(message)
        }
        FetchFailure::Status(status) => classify_status(*status, message),
    }
}

fn classify_status(status: u16, message: String) -> ConfigError {
    let error = match status {
        401 | 403 => ConfigError::new(ErrorKind::Authentication, false, message),
        429 => ConfigError::new(ErrorKind::RateLimit, true, message),
        500 | 502 | 503 | 504 => ConfigError::new(ErrorKind::ServerError, true, message),
        other => ConfigError::new(ErrorKind::Unknown, other >= 500, message),
    };
    error.with_status(status)
}
