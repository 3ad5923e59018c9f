//! Remote configuration client with caching, retries and stale fallback.
//!
//! # Fetch algorithm
//!
//! 1. A fresh cache entry is returned without touching the network.
//! 2. Otherwise each attempt runs under a fixed deadline; failures are classified.
//! 3. Retryable failures back off `min(base * multiplier^(n-1), max)` and retry
//!    until the attempt budget is spent.
//! 4. When attempts run out (or the error is final) a retryable failure is
//!    answered from the cache, even if expired, marked [`SnapshotSource::Cached`].
//!    Anything else propagates.
//! 5. Successful values replace the cache entry.
//!
//! The only suspension points are the network call and the backoff sleep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::cached::{ConfigCache, DEFAULT_CACHE_TTL};
use super::client::{RemoteSource, RemoteSourceConfig};
use super::error::{classify, ConfigError, FetchFailure, Result, TransportFailure};
use super::retry::RetryPolicy;
use crate::observability::MetricsRecorder;
use crate::snapshot::{ConfigSnapshot, SnapshotSource};

/// Default per-attempt deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a fetch with the details the manager needs for health reporting.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub snapshot: ConfigSnapshot,
    /// Network attempts made; zero for a fresh cache hit.
    pub attempts: u32,
    /// The failure that was absorbed by serving a stale cache entry.
    pub fallback_cause: Option<ConfigError>,
}

/// Fetches remote configuration for one application.
pub struct RemoteConfigClient {
    source: Arc<dyn RemoteSource>,
    cache: Option<ConfigCache>,
    retry: RetryPolicy,
    request_timeout: Duration,
    metrics: MetricsRecorder,
}

impl RemoteConfigClient {
    /// Client with the default retry policy, deadline, and a 5 minute cache.
    pub fn new(source: impl RemoteSource + 'static) -> Self {
        Self::from_shared(Arc::new(source))
    }

    pub fn from_shared(source: Arc<dyn RemoteSource>) -> Self {
        Self {
            source,
            cache: Some(ConfigCache::new(DEFAULT_CACHE_TTL)),
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = Some(ConfigCache::new(ttl));
        self
    }

    /// Disable caching: no short-circuit and no stale fallback.
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn cache(&self) -> Option<&ConfigCache> {
        self.cache.as_ref()
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Fetch a snapshot, consulting the cache first.
    pub async fn fetch(&self, config: &RemoteSourceConfig) -> Result<ConfigSnapshot> {
        self.fetch_report(config).await.map(|report| report.snapshot)
    }

    /// Like [`fetch`](Self::fetch) but also reports attempts and absorbed errors.
    pub async fn fetch_report(&self, config: &RemoteSourceConfig) -> Result<FetchReport> {
        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.get_fresh() {
                self.metrics.record_cache_lookup(true);
                debug!(keys = entry.snapshot.len(), "Serving remote configuration from cache");
                return Ok(FetchReport {
                    snapshot: ConfigSnapshot::captured(
                        entry.snapshot,
                        SnapshotSource::Remote,
                        entry.fetched_at,
                    ),
                    attempts: 0,
                    fallback_cause: None,
                });
            }
            self.metrics.record_cache_lookup(false);
        }

        self.fetch_from_network(config).await
    }

    /// Skip the fresh-cache short-circuit and always go to the network.
    ///
    /// Stale fallback still applies when every attempt fails.
    pub async fn refetch_report(&self, config: &RemoteSourceConfig) -> Result<FetchReport> {
        self.fetch_from_network(config).await
    }

    #[instrument(
        name = "remote_fetch",
        skip(self, config),
        fields(
            source = self.source.name(),
            app = %config.application_name(),
            env = %config.environment()
        )
    )]
    async fn fetch_from_network(&self, config: &RemoteSourceConfig) -> Result<FetchReport> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        let error = loop {
            attempt += 1;
            match self.attempt(config).await {
                Ok(values) => {
                    self.metrics.record_fetch_attempt(None);
                    self.metrics.record_fetch_duration(started.elapsed().as_secs_f64());
                    return Ok(self.accept(values, attempt));
                }
                Err(err) => {
                    self.metrics.record_fetch_attempt(Some(err.kind));
                    if err.retryable && self.retry.has_attempts_left(attempt) {
                        let delay = self.retry.delay_for(attempt);
                        warn!(
                            attempt,
                            max_attempts = self.retry.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Remote configuration fetch failed, retrying"
                        );
                        self.metrics.record_retry(delay.as_secs_f64());
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    break err;
                }
            }
        };

        self.metrics.record_fetch_duration(started.elapsed().as_secs_f64());

        if error.retryable {
            if let Some(entry) = self.cache.as_ref().and_then(ConfigCache::get) {
                warn!(
                    attempts = attempt,
                    error = %error,
                    cached_at = %entry.fetched_at,
                    "Remote configuration unavailable, serving stale cached values"
                );
                self.metrics.record_stale_fallback();
                return Ok(FetchReport {
                    snapshot: ConfigSnapshot::captured(
                        entry.snapshot,
                        SnapshotSource::Cached,
                        entry.fetched_at,
                    ),
                    attempts: attempt,
                    fallback_cause: Some(error),
                });
            }
        }

        warn!(attempts = attempt, error = %error, "Remote configuration fetch failed");
        Err(error)
    }

    async fn attempt(&self, config: &RemoteSourceConfig) -> Result<HashMap<String, String>> {
        match tokio::time::timeout(self.request_timeout, self.source.fetch_secrets(config)).await {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(failure)) => Err(classify(&failure)),
            Err(_) => Err(classify(&FetchFailure::Transport(TransportFailure::DeadlineExceeded(
                format!("no response within {}ms", self.request_timeout.as_millis()),
            )))),
        }
    }

    fn accept(&self, values: HashMap<String, String>, attempts: u32) -> FetchReport {
        if values.is_empty() {
            // Indistinguishable from an application with nothing configured.
            info!(attempts, "Remote configuration fetch succeeded with zero secrets");
            self.metrics.record_empty_fetch();
        } else {
            info!(attempts, keys = values.len(), "Fetched remote configuration");
        }

        let snapshot = match &self.cache {
            Some(cache) => {
                let entry = cache.put(values);
                ConfigSnapshot::captured(entry.snapshot, SnapshotSource::Remote, entry.fetched_at)
            }
            None => ConfigSnapshot::new(values, SnapshotSource::Remote),
        };

        FetchReport {
            snapshot,
            attempts,
            fallback_cause: None,
        }
    }
}

impl std::fmt::Debug for RemoteConfigClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfigClient")
            .field("source", &self.source.name())
            .field("cache_enabled", &self.cache.is_some())
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
