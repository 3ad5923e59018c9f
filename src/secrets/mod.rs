//! Configuration acquisition from a remote secrets service and local sources.
//!
//! # Architecture
//!
//! Remote values are fetched through the [`RemoteSource`] trait. The default
//! implementation, [`HttpSecretsSource`], talks to a secrets service over HTTP;
//! tests substitute their own. [`RemoteConfigClient`] wraps a source with:
//!
//! - a single-entry TTL cache ([`ConfigCache`]) that also serves as a stale fallback
//! - bounded exponential backoff ([`RetryPolicy`]) with a per-attempt deadline
//! - error classification into [`ConfigError`] via [`classify`]
//!
//! Local values come from a [`LocalSource`], normally the
//! [`LocalEnvironmentLoader`] which layers `.env` files under process variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use cfgsync::secrets::{HttpSecretsSource, RemoteConfigClient, RemoteSourceConfig};
//!
//! let client = RemoteConfigClient::new(HttpSecretsSource::new("https://secrets.example.com"));
//! let config = RemoteSourceConfig::new("token", "billing", "production");
//! let snapshot = client.fetch(&config).await?;
//! println!("{} keys from {}", snapshot.len(), snapshot.source());
//! ```

pub mod cached;
pub mod client;
pub mod env;
pub mod error;
pub mod http;
pub mod remote;
pub mod retry;
pub mod types;

pub use cached::{CacheEntry, ConfigCache, DEFAULT_CACHE_TTL};
pub use client::{
    RemoteSource, RemoteSourceConfig, ACCESS_TOKEN_KEY, APP_NAME_KEY, ENVIRONMENT_KEY,
};
pub use env::{LocalEnvironmentLoader, LocalLayers, LocalSource};
pub use error::{classify, ConfigError, ErrorKind, FetchFailure, TransportFailure};
pub use http::{parse_secrets, HttpSecretsSource};
pub use remote::{FetchReport, RemoteConfigClient, DEFAULT_REQUEST_TIMEOUT};
pub use retry::RetryPolicy;
pub use types::SecretString;
