//! TTL cache for the last successful remote snapshot.
//!
//! Holds at most one entry. A fresh entry short-circuits the network; an
//! expired one is kept around so a failing fetch can still serve it as a
//! stale fallback. Purely in memory, never persisted.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default time-to-live for cached remote values.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// The last successfully fetched remote values.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub snapshot: HashMap<String, String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug)]
struct StoredEntry {
    entry: CacheEntry,
    stored_at: Instant,
}

/// Thread-safe single-entry cache with a time-to-live.
#[derive(Debug)]
pub struct ConfigCache {
    entry: RwLock<Option<StoredEntry>>,
    ttl: Duration,
}

impl ConfigCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached entry, fresh or not.
    pub fn get(&self) -> Option<CacheEntry> {
        let guard = self.entry.read().ok()?;
        guard.as_ref().map(|stored| stored.entry.clone())
    }

    /// The cached entry only if it is still within the TTL.
    pub fn get_fresh(&self) -> Option<CacheEntry> {
        let guard = self.entry.read().ok()?;
        guard
            .as_ref()
            .filter(|stored| stored.stored_at.elapsed() < self.ttl)
            .map(|stored| stored.entry.clone())
    }

    /// Replace the cached entry, stamping it with the current time.
    pub fn put(&self, snapshot: HashMap<String, String>) -> CacheEntry {
        let entry = CacheEntry {
            snapshot,
            fetched_at: Utc::now(),
        };
        if let Ok(mut guard) = self.entry.write() {
            *guard = Some(StoredEntry {
                entry: entry.clone(),
                stored_at: Instant::now(),
            });
        }
        entry
    }

    /// `now - fetched_at < ttl`. False when empty.
    pub fn is_fresh(&self) -> bool {
        self.entry
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|stored| stored.stored_at.elapsed() < self.ttl))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.entry.write() {
            *guard = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entry.read().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
