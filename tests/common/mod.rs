//! Shared helpers for integration tests

#![allow(dead_code)]

use cfgsync::config::RetrySettings;
use cfgsync::secrets::{HttpSecretsSource, RemoteConfigClient, RemoteSourceConfig, RetryPolicy};
use cfgsync::ManagerSettings;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

pub const TOKEN: &str = "test-access-token";
pub const APP: &str = "billing";

/// Body in the secrets service response format.
pub fn secrets_body(pairs: &[(&str, &str)]) -> Value {
    let secrets: Vec<Value> = pairs
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect();
    json!({ "secrets": secrets })
}

pub fn remote_config() -> RemoteSourceConfig {
    RemoteSourceConfig::new(TOKEN, APP, "production")
}

pub fn retry_policy(max_attempts: u32, base_ms: u64, max_ms: u64) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(base_ms),
        max_delay: Duration::from_millis(max_ms),
        backoff_multiplier: 2.0,
    }
}

/// Client for a mock server with a short deadline and quick retries.
pub fn client(base_url: &str, max_attempts: u32) -> RemoteConfigClient {
    RemoteConfigClient::new(HttpSecretsSource::new(base_url))
        .with_retry_policy(retry_policy(max_attempts, 10, 20))
        .with_request_timeout(Duration::from_secs(2))
}

/// Manager settings pointing at a mock server and a temp directory.
pub fn settings(base_url: &str, dir: &Path) -> ManagerSettings {
    ManagerSettings {
        base_url: base_url.to_string(),
        environment: "test".to_string(),
        config_dir: dir.to_path_buf(),
        background_refresh: false,
        request_timeout_ms: 2000,
        retry: RetrySettings {
            max_attempts: 2,
            base_delay_ms: 10,
            max_delay_ms: 20,
            backoff_multiplier: 2.0,
        },
        ..Default::default()
    }
}

pub fn write_env(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}
