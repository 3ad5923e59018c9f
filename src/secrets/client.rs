//! Remote source trait and connection parameters.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::error::FetchFailure;
use super::types::SecretString;

/// Local key holding the remote service access token.
pub const ACCESS_TOKEN_KEY: &str = "CFGSYNC_ACCESS_TOKEN";
/// Local key holding the application name sent as `X-App-Name`.
pub const APP_NAME_KEY: &str = "CFGSYNC_APP_NAME";
/// Local key holding the environment sent as `X-Environment`.
pub const ENVIRONMENT_KEY: &str = "CFGSYNC_ENVIRONMENT";

const DEFAULT_APP_NAME: &str = "default";

/// Parameters identifying what to fetch from the remote service.
///
/// Built once from the local environment at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSourceConfig {
    access_token: SecretString,
    application_name: String,
    environment: String,
}

impl RemoteSourceConfig {
    pub fn new(
        access_token: impl Into<SecretString>,
        application_name: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            application_name: application_name.into(),
            environment: environment.into(),
        }
    }

    /// Build the remote parameters from a layered local map.
    ///
    /// Returns `None` when no non-empty access token is present, which puts the
    /// manager in local-only mode.
    pub fn from_local(local: &HashMap<String, String>, default_environment: &str) -> Option<Self> {
        let token = local
            .get(ACCESS_TOKEN_KEY)
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())?;

        let application_name = local
            .get(APP_NAME_KEY)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_APP_NAME);

        let environment = local
            .get(ENVIRONMENT_KEY)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .unwrap_or(default_environment);

        Some(Self::new(token, application_name, environment))
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }
}

/// A backend able to return the key/value pairs configured for an application.
///
/// Implementations perform exactly one attempt and report failures unclassified;
/// retries, deadlines, caching, and classification live in
/// [`RemoteConfigClient`](super::RemoteConfigClient).
///
/// # Security
///
/// Implementations MUST NOT log secret values or the access token.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch all key/value pairs for the configured application.
    async fn fetch_secrets(
        &self,
        config: &RemoteSourceConfig,
    ) -> Result<HashMap<String, String>, FetchFailure>;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        "remote"
    }
}

#[async_trait]
impl<T: RemoteSource + ?Sized> RemoteSource for Arc<T> {
    async fn fetch_secrets(
        &self,
        config: &RemoteSourceConfig,
    ) -> Result<HashMap<String, String>, FetchFailure> {
        (**self).fetch_secrets(config).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
