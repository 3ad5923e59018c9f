//! HTTP implementation of [`RemoteSource`].
//!
//! Talks to the remote secrets service:
//!
//! ```text
//! GET {base_url}/v1/secrets
//! Authorization: Bearer <token>
//! X-App-Name: <application>
//! X-Environment: <environment>
//! ```
//!
//! and expects `{ "secrets": [ { "key": "...", "value": "..." } ] }` back.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, trace};

use super::client::{RemoteSource, RemoteSourceConfig};
use super::error::{FetchFailure, TransportFailure};

const SECRETS_PATH: &str = "/v1/secrets";

#[derive(Debug, Deserialize)]
struct SecretsResponse {
    #[serde(default)]
    secrets: Vec<Value>,
}

/// Remote source backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpSecretsSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSecretsSource {
    /// Create a source for the service at `base_url` (trailing slashes are ignored).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cfgsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self::with_client(client, base_url)
    }

    /// Create a source that reuses an existing HTTP client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn secrets_url(&self) -> String {
        format!("{}{}", self.base_url, SECRETS_PATH)
    }
}

#[async_trait]
impl RemoteSource for HttpSecretsSource {
    async fn fetch_secrets(
        &self,
        config: &RemoteSourceConfig,
    ) -> Result<HashMap<String, String>, FetchFailure> {
        let url = self.secrets_url();
        debug!(url = %url, app = %config.application_name(), "GET remote secrets");

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(config.access_token().expose_secret())
            .header("Content-Type", "application/json")
            .header("X-App-Name", config.application_name());

        if !config.environment().is_empty() {
            request = request.header("X-Environment", config.environment());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchFailure::Transport(TransportFailure::from(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchFailure::Transport(TransportFailure::from(&e)))?;

        parse_secrets(&body)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Parse a success body into a key/value map.
///
/// Entries without a non-empty string `key` or without a scalar `value` are
/// dropped. A body without a `secrets` field is an empty list.
pub fn parse_secrets(body: &[u8]) -> Result<HashMap<String, String>, FetchFailure> {
    let parsed: SecretsResponse =
        serde_json::from_slice(body).map_err(|e| FetchFailure::Malformed(e.to_string()))?;

    let total = parsed.secrets.len();
    let values: HashMap<String, String> =
        parsed.secrets.iter().filter_map(entry_to_pair).collect();

    if values.len() < total {
        trace!(dropped = total - values.len(), "Dropped incomplete secret entries");
    }

    Ok(values)
}

fn entry_to_pair(entry: &Value) -> Option<(String, String)> {
    let key = entry.get("key")?.as_str().filter(|k| !k.is_empty())?;
    let value = match entry.get("value")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    Some((key.to_string(), value))
}
