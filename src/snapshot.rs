//! Immutable configuration snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Where the values of a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// A successful remote fetch (or a cache entry still within its TTL).
    Remote,
    /// Local files and process variables only.
    LocalFallback,
    /// An expired cache entry served because the remote fetch failed.
    Cached,
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotSource::Remote => write!(f, "remote"),
            SnapshotSource::LocalFallback => write!(f, "local_fallback"),
            SnapshotSource::Cached => write!(f, "cached"),
        }
    }
}

/// One timestamped view of configuration key/value pairs.
///
/// Keys are case-sensitive and unique. An unset key is simply absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    values: HashMap<String, String>,
    source: SnapshotSource,
    captured_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    /// Snapshot captured now.
    pub fn new(values: HashMap<String, String>, source: SnapshotSource) -> Self {
        Self::captured(values, source, Utc::now())
    }

    pub fn captured(
        values: HashMap<String, String>,
        source: SnapshotSource,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            values,
            source,
            captured_at,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    pub fn source(&self) -> SnapshotSource {
        self.source
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
