//! # Configuration Manager
//!
//! Owns the published configuration snapshot and the state machine around it:
//!
//! ```text
//!                 initialize()
//! Uninitialized ──────────────▶ Initializing ──┬──▶ Ready     (remote or local-only, valid)
//!       ▲                                       ├──▶ Degraded  (served from a fallback)
//!       │                                       └──▶ Uninitialized (fatal error)
//!       └───────────── destroy() ◀──── Ready / Degraded ◀──── refresh()
//! ```
//!
//! Concurrent `initialize()` calls share one in-flight load. Reads never block
//! on the network: `get`/`get_all` read the last published snapshot, which is
//! replaced as a whole on every successful load.

pub mod merge;
pub mod validation;

pub use merge::merge;
pub use validation::{validate, Predicate, ValidationReport, ValidationRule};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::ManagerSettings;
use crate::observability::{HealthCheck, HealthProvider, MetricsRecorder};
use crate::secrets::{
    ConfigError, HttpSecretsSource, LocalEnvironmentLoader, LocalLayers, LocalSource,
    RemoteConfigClient, RemoteSource, RemoteSourceConfig,
};
use crate::snapshot::{ConfigSnapshot, SnapshotSource};

const HEALTH_COMPONENT: &str = "configuration";

/// Lifecycle state of a [`ConfigManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Degraded,
}

impl ManagerState {
    /// A snapshot is published and readable.
    pub fn is_serving(&self) -> bool {
        matches!(self, ManagerState::Ready | ManagerState::Degraded)
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerState::Uninitialized => write!(f, "uninitialized"),
            ManagerState::Initializing => write!(f, "initializing"),
            ManagerState::Ready => write!(f, "ready"),
            ManagerState::Degraded => write!(f, "degraded"),
        }
    }
}

/// Errors raised by [`ConfigManager`] operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ManagerError {
    #[error("configuration manager is not initialized")]
    NotInitialized,

    #[error("remote configuration fetch failed: {0}")]
    Fetch(#[from] ConfigError),

    #[error("configuration validation failed:\n  - {}", .errors.join("\n  - "))]
    Validation { errors: Vec<String> },
}

impl ManagerError {
    /// The error in the form stored for health and stats reporting.
    pub fn to_config_error(&self) -> ConfigError {
        match self {
            ManagerError::Fetch(err) => err.clone(),
            ManagerError::Validation { errors } => ConfigError::validation(errors.join("; ")),
            ManagerError::NotInitialized => ConfigError::unknown(self.to_string()),
        }
    }
}

/// Result of [`ConfigManager::health_status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// False whenever the last load needed a fallback.
    pub healthy: bool,
    pub initialized: bool,
    pub last_error: Option<ConfigError>,
}

/// Result of [`ConfigManager::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStats {
    pub initialized: bool,
    pub state: ManagerState,
    pub config_count: usize,
    /// An access token was found locally, so the remote service is in use.
    #[serde(rename = "phaseConfigured")]
    pub remote_configured: bool,
    pub cache_enabled: bool,
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_error: Option<ConfigError>,
    pub healthy: bool,
    pub source: Option<SnapshotSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    Initialize,
    Refresh,
}

impl LoadMode {
    fn as_str(&self) -> &'static str {
        match self {
            LoadMode::Initialize => "initialize",
            LoadMode::Refresh => "refresh",
        }
    }
}

struct LoadOutcome {
    snapshot: ConfigSnapshot,
    /// Set when the snapshot came from a fallback.
    fallback_cause: Option<ConfigError>,
    remote_configured: bool,
}

#[derive(Debug, Default)]
struct Status {
    state: ManagerState,
    healthy: bool,
    remote_configured: bool,
    last_error: Option<ConfigError>,
    last_refresh: Option<DateTime<Utc>>,
    last_attempt: Option<Instant>,
    /// Bumped by `destroy()`; loads started under an older generation are discarded.
    generation: u64,
}

type InitFlight = Shared<BoxFuture<'static, Result<(), ManagerError>>>;

// Lock order when nesting: in_flight, then status, then snapshot.
struct Inner {
    settings: ManagerSettings,
    remote: RemoteConfigClient,
    local: Arc<dyn LocalSource>,
    rules: Vec<ValidationRule>,
    status: RwLock<Status>,
    snapshot: RwLock<Option<Arc<ConfigSnapshot>>>,
    in_flight: Mutex<Option<InitFlight>>,
    refreshing: AtomicBool,
    metrics: MetricsRecorder,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    /// Fetch, merge and validate. Publishes nothing.
    async fn load(&self, mode: LoadMode) -> Result<LoadOutcome, ManagerError> {
        let local = self.local.load();

        let Some(remote_config) =
            RemoteSourceConfig::from_local(&local.flatten(), &self.settings.environment)
        else {
            info!(
                local = self.local.name(),
                "No access token configured, using local configuration only"
            );
            let snapshot = merge(None, &local);
            let report = validate(&snapshot, &self.rules);
            if !report.valid {
                return Err(ManagerError::Validation {
                    errors: report.errors,
                });
            }
            return Ok(LoadOutcome {
                snapshot,
                fallback_cause: None,
                remote_configured: false,
            });
        };

        let fetched = match mode {
            LoadMode::Initialize => self.remote.fetch_report(&remote_config).await,
            LoadMode::Refresh => self.remote.refetch_report(&remote_config).await,
        };

        let report = match fetched {
            Ok(report) => report,
            Err(err) if mode == LoadMode::Initialize && self.settings.fallback_to_local => {
                warn!(
                    error = %err,
                    "Remote configuration unavailable, falling back to local configuration"
                );
                return self.local_fallback(&local, err);
            }
            Err(err) => return Err(ManagerError::Fetch(err)),
        };

        let merged = merge(Some(&report.snapshot), &local);
        let validation = validate(&merged, &self.rules);
        if validation.valid {
            return Ok(LoadOutcome {
                snapshot: merged,
                fallback_cause: report.fallback_cause,
                remote_configured: true,
            });
        }

        if mode == LoadMode::Initialize && self.settings.fallback_to_local {
            warn!(
                violations = validation.errors.len(),
                "Merged configuration failed validation, retrying with local configuration only"
            );
            let cause = ConfigError::validation(validation.errors.join("; "));
            return self.local_fallback(&local, cause);
        }

        Err(ManagerError::Validation {
            errors: validation.errors,
        })
    }

    fn local_fallback(
        &self,
        local: &LocalLayers,
        cause: ConfigError,
    ) -> Result<LoadOutcome, ManagerError> {
        let snapshot = merge(None, local);
        let report = validate(&snapshot, &self.rules);
        if !report.valid {
            return Err(ManagerError::Validation {
                errors: report.errors,
            });
        }

        self.metrics.record_local_fallback();
        Ok(LoadOutcome {
            snapshot,
            fallback_cause: Some(cause),
            remote_configured: true,
        })
    }

    async fn run_initialize(self: Arc<Self>, generation: u64) -> Result<(), ManagerError> {
        info!("Initializing configuration");
        let result = self.load(LoadMode::Initialize).await;

        let mut in_flight = lock(&self.in_flight);
        let mut status = write(&self.status);
        if status.generation != generation {
            warn!("Configuration manager was destroyed during initialization, discarding result");
            return Err(ManagerError::NotInitialized);
        }
        *in_flight = None;
        status.last_attempt = Some(Instant::now());

        match result {
            Ok(outcome) => {
                self.publish(&mut status, outcome, LoadMode::Initialize);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Configuration initialization failed");
                status.state = ManagerState::Uninitialized;
                status.healthy = false;
                status.last_error = Some(err.to_config_error());
                self.metrics.record_load(LoadMode::Initialize.as_str(), false);
                self.metrics.set_healthy(false);
                Err(err)
            }
        }
    }

    fn publish(&self, status: &mut Status, outcome: LoadOutcome, mode: LoadMode) {
        let LoadOutcome {
            snapshot,
            fallback_cause,
            remote_configured,
        } = outcome;
        let healthy = fallback_cause.is_none();
        let source = snapshot.source();
        let keys = snapshot.len();

        *write(&self.snapshot) = Some(Arc::new(snapshot));

        status.state = if healthy { ManagerState::Ready } else { ManagerState::Degraded };
        status.healthy = healthy;
        status.remote_configured = remote_configured;
        status.last_refresh = Some(Utc::now());
        status.last_error = fallback_cause;

        self.metrics.record_load(mode.as_str(), true);
        self.metrics.record_published(keys, source);
        self.metrics.set_healthy(healthy);

        info!(
            operation = mode.as_str(),
            keys,
            source = %source,
            state = %status.state,
            "Published configuration snapshot"
        );
    }
}

/// Acquires, merges, validates and serves application configuration.
///
/// Cheap to clone; clones share the same state. Construct one at startup and
/// pass it to consumers.
#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<Inner>,
}

impl ConfigManager {
    pub fn new(settings: ManagerSettings) -> Self {
        Self::builder().settings(settings).build()
    }

    /// Manager configured from `CFGSYNC_*` process variables.
    pub fn from_env() -> crate::errors::Result<Self> {
        let settings = ManagerSettings::from_env()?;
        settings.validate()?;
        Ok(Self::new(settings))
    }

    pub fn builder() -> ConfigManagerBuilder {
        ConfigManagerBuilder::default()
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> ManagerState {
        read(&self.inner.status).state
    }

    pub fn is_initialized(&self) -> bool {
        self.state().is_serving()
    }

    /// Load and publish the first snapshot.
    ///
    /// Returns immediately once the manager is serving. Calls made while an
    /// initialization is running wait for that same run and see its result.
    pub async fn initialize(&self) -> Result<(), ManagerError> {
        let flight = {
            let mut in_flight = lock(&self.inner.in_flight);
            let existing = in_flight.clone();
            match existing {
                Some(flight) => {
                    debug!("Joining in-flight initialization");
                    flight
                }
                None => {
                    let generation = {
                        let mut status = write(&self.inner.status);
                        if status.state.is_serving() {
                            return Ok(());
                        }
                        status.state = ManagerState::Initializing;
                        status.generation
                    };

                    let span = crate::load_span!("initialize", self.inner.settings.environment);
                    let inner = Arc::clone(&self.inner);
                    let flight = async move { inner.run_initialize(generation).await }
                        .instrument(span)
                        .boxed()
                        .shared();
                    *in_flight = Some(flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    /// Reload from the network, bypassing a fresh cache entry.
    ///
    /// On failure the previous snapshot stays published. With local fallback
    /// enabled the manager moves to `Degraded` and this returns `Ok`; otherwise
    /// the error is returned and the state is left as it was.
    pub async fn refresh(&self) -> Result<(), ManagerError> {
        let generation = {
            let status = read(&self.inner.status);
            if !status.state.is_serving() {
                return Err(ManagerError::NotInitialized);
            }
            status.generation
        };

        let span = crate::load_span!("refresh", self.inner.settings.environment);
        let result = self.inner.load(LoadMode::Refresh).instrument(span).await;

        let mut status = write(&self.inner.status);
        if status.generation != generation {
            return Err(ManagerError::NotInitialized);
        }
        status.last_attempt = Some(Instant::now());

        match result {
            Ok(outcome) => {
                self.inner.publish(&mut status, outcome, LoadMode::Refresh);
                Ok(())
            }
            Err(err) => {
                self.inner.metrics.record_load(LoadMode::Refresh.as_str(), false);
                status.last_error = Some(err.to_config_error());

                if self.inner.settings.fallback_to_local {
                    warn!(error = %err, "Configuration refresh failed, keeping previous snapshot");
                    status.state = ManagerState::Degraded;
                    status.healthy = false;
                    self.inner.metrics.set_healthy(false);
                    Ok(())
                } else {
                    error!(error = %err, "Configuration refresh failed");
                    Err(err)
                }
            }
        }
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Result<Arc<ConfigSnapshot>, ManagerError> {
        let snapshot = read(&self.inner.snapshot)
            .clone()
            .ok_or(ManagerError::NotInitialized)?;
        self.schedule_background_refresh();
        Ok(snapshot)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, ManagerError> {
        Ok(self.snapshot()?.get(key).map(str::to_owned))
    }

    /// Copy of every key/value pair.
    pub fn get_all(&self) -> Result<HashMap<String, String>, ManagerError> {
        Ok(self.snapshot()?.values().clone())
    }

    pub fn health_status(&self) -> HealthReport {
        let status = read(&self.inner.status);
        let initialized = status.state.is_serving();
        HealthReport {
            healthy: initialized && status.healthy,
            initialized,
            last_error: status.last_error.clone(),
        }
    }

    pub fn stats(&self) -> ManagerStats {
        let snapshot = read(&self.inner.snapshot).clone();
        let status = read(&self.inner.status);
        let initialized = status.state.is_serving();

        ManagerStats {
            initialized,
            state: status.state,
            config_count: snapshot.as_ref().map_or(0, |s| s.len()),
            remote_configured: status.remote_configured,
            cache_enabled: self.inner.remote.cache_enabled(),
            last_refresh: status.last_refresh,
            last_error: status.last_error.clone(),
            healthy: initialized && status.healthy,
            source: snapshot.map(|s| s.source()),
        }
    }

    /// Drop the snapshot and cache and return to `Uninitialized`.
    ///
    /// An initialization still running is detached and its result discarded.
    pub fn destroy(&self) {
        let mut in_flight = lock(&self.inner.in_flight);
        let mut status = write(&self.inner.status);

        *in_flight = None;
        let generation = status.generation.wrapping_add(1);
        *status = Status {
            generation,
            ..Status::default()
        };
        *write(&self.inner.snapshot) = None;
        self.inner.remote.clear_cache();

        info!("Configuration manager destroyed");
    }

    fn schedule_background_refresh(&self) {
        if !self.inner.settings.background_refresh {
            return;
        }

        let ttl = self.inner.settings.cache_ttl();
        let due = {
            let status = read(&self.inner.status);
            status.remote_configured
                && status.state.is_serving()
                && status.last_attempt.is_some_and(|at| at.elapsed() >= ttl)
        };
        if !due {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if self
            .inner
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let manager = self.clone();
        handle.spawn(async move {
            debug!("Starting background configuration refresh");
            if let Err(e) = manager.refresh().await {
                warn!(error = %e, "Background configuration refresh failed");
            }
            manager.inner.refreshing.store(false, Ordering::Release);
        });
    }
}

impl fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigManager")
            .field("state", &self.state())
            .field("remote", &self.inner.remote)
            .field("local", &self.inner.local.name())
            .field("rules", &self.inner.rules.len())
            .finish()
    }
}

#[async_trait]
impl HealthProvider for ConfigManager {
    async fn health_check(&self) -> HealthCheck {
        let stats = self.stats();

        let check = if !stats.initialized {
            let message = match &stats.last_error {
                Some(err) => format!("Configuration not initialized: {}", err),
                None => "Configuration not initialized".to_string(),
            };
            HealthCheck::unhealthy(HEALTH_COMPONENT, message)
        } else if stats.healthy {
            HealthCheck::healthy(HEALTH_COMPONENT)
        } else {
            let message = match &stats.last_error {
                Some(err) => format!("Serving fallback configuration: {}", err),
                None => "Serving fallback configuration".to_string(),
            };
            HealthCheck::degraded(HEALTH_COMPONENT, message)
        };

        let mut check = check
            .with_metadata("state", stats.state.to_string())
            .with_metadata("config_count", stats.config_count.to_string())
            .with_metadata("remote_configured", stats.remote_configured.to_string());
        if let Some(source) = stats.source {
            check = check.with_metadata("source", source.to_string());
        }
        check
    }
}

/// Builder for [`ConfigManager`].
///
/// Defaults: [`ManagerSettings::default`], an [`HttpSecretsSource`] for the
/// settings' base URL and a [`LocalEnvironmentLoader`] for the settings'
/// config directory.
#[derive(Default)]
pub struct ConfigManagerBuilder {
    settings: Option<ManagerSettings>,
    remote: Option<Arc<dyn RemoteSource>>,
    local: Option<Arc<dyn LocalSource>>,
    rules: Vec<ValidationRule>,
}

impl ConfigManagerBuilder {
    pub fn settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn remote_source(mut self, source: impl RemoteSource + 'static) -> Self {
        self.remote = Some(Arc::new(source));
        self
    }

    pub fn local_source(mut self, source: impl LocalSource + 'static) -> Self {
        self.local = Some(Arc::new(source));
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = ValidationRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn build(self) -> ConfigManager {
        let settings = self.settings.unwrap_or_default();

        let remote_source: Arc<dyn RemoteSource> = match self.remote {
            Some(source) => source,
            None => Arc::new(HttpSecretsSource::new(settings.base_url.clone())),
        };
        let remote = RemoteConfigClient::from_shared(remote_source)
            .with_retry_policy(settings.retry_policy())
            .with_request_timeout(settings.request_timeout());
        let remote = if settings.cache_enabled {
            remote.with_cache_ttl(settings.cache_ttl())
        } else {
            remote.without_cache()
        };

        let local: Arc<dyn LocalSource> = match self.local {
            Some(source) => source,
            None => Arc::new(LocalEnvironmentLoader::new(
                settings.config_dir.clone(),
                settings.environment.clone(),
            )),
        };

        ConfigManager {
            inner: Arc::new(Inner {
                settings,
                remote,
                local,
                rules: self.rules,
                status: RwLock::new(Status::default()),
                snapshot: RwLock::new(None),
                in_flight: Mutex::new(None),
                refreshing: AtomicBool::new(false),
                metrics: MetricsRecorder::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrySettings;
    use crate::secrets::{ErrorKind, FetchFailure, ACCESS_TOKEN_KEY};
    use crate::observability::HealthStatus;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tracing_test::traced_test;

    type Response = std::result::Result<HashMap<String, String>, u16>;

    /// Returns a switchable response after an optional delay.
    struct MockRemote {
        response: Mutex<Response>,
        calls: AtomicU32,
        delay: Duration,
    }

    impl MockRemote {
        fn new(response: Response) -> Arc<Self> {
            Self::delayed(response, Duration::ZERO)
        }

        fn delayed(response: Response, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(response),
                calls: AtomicU32::new(0),
                delay,
            })
        }

        fn set(&self, response: Response) {
            *self.response.lock().unwrap() = response;
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteSource for MockRemote {
        async fn fetch_secrets(
            &self,
            _config: &RemoteSourceConfig,
        ) -> std::result::Result<HashMap<String, String>, FetchFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.response.lock().unwrap().clone().map_err(FetchFailure::Status)
        }
    }

    struct FixedLocal(LocalLayers);

    impl LocalSource for FixedLocal {
        fn load(&self) -> LocalLayers {
            self.0.clone()
        }
    }

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn settings() -> ManagerSettings {
        ManagerSettings {
            background_refresh: false,
            request_timeout_ms: 1000,
            retry: RetrySettings {
                max_attempts: 1,
                base_delay_ms: 1,
                max_delay_ms: 1,
                backoff_multiplier: 1.0,
            },
            ..Default::default()
        }
    }

    fn with_token(files: &[(&str, &str)]) -> FixedLocal {
        let mut files = map(files);
        files.insert(ACCESS_TOKEN_KEY.to_string(), "token".to_string());
        FixedLocal(LocalLayers {
            files,
            process: HashMap::new(),
        })
    }

    fn manager(remote: &Arc<MockRemote>, local: FixedLocal) -> ConfigManagerBuilder {
        ConfigManager::builder()
            .settings(settings())
            .remote_source(Arc::clone(remote))
            .local_source(local)
    }

    #[tokio::test]
    async fn test_reads_before_initialize_fail() {
        let remote = MockRemote::new(Ok(map(&[])));
        let manager = manager(&remote, with_token(&[])).build();

        assert_eq!(manager.state(), ManagerState::Uninitialized);
        assert_eq!(manager.get("A"), Err(ManagerError::NotInitialized));
        assert_eq!(manager.get_all(), Err(ManagerError::NotInitialized));
        assert_eq!(manager.refresh().await, Err(ManagerError::NotInitialized));
        assert!(!manager.health_status().initialized);
    }

    #[tokio::test]
    async fn test_initialize_ready() {
        let remote = MockRemote::new(Ok(map(&[("DB_URL", "postgres://remote")])));
        let manager = manager(&remote, with_token(&[("DB_URL", "file"), ("PORT", "80")]))
            .rule(ValidationRule::required("DB_URL"))
            .build();

        manager.initialize().await.unwrap();

        assert_eq!(manager.state(), ManagerState::Ready);
        assert_eq!(manager.get("DB_URL").unwrap().as_deref(), Some("postgres://remote"));
        assert_eq!(manager.get("PORT").unwrap().as_deref(), Some("80"));
        assert_eq!(manager.get("MISSING").unwrap(), None);

        let health = manager.health_status();
        assert!(health.healthy && health.initialized);
        assert!(health.last_error.is_none());

        let stats = manager.stats();
        assert!(stats.remote_configured);
        assert!(stats.cache_enabled);
        assert_eq!(stats.source, Some(SnapshotSource::Remote));
        assert!(stats.last_refresh.is_some());

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["phaseConfigured"], true);
        assert!(json.get("remoteConfigured").is_none());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let remote = MockRemote::new(Ok(map(&[("A", "1")])));
        let manager = manager(&remote, with_token(&[])).build();

        manager.initialize().await.unwrap();
        manager.initialize().await.unwrap();
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_initialize_shares_one_fetch() {
        let remote = MockRemote::delayed(Ok(map(&[("A", "1")])), Duration::from_millis(50));
        let manager = manager(&remote, with_token(&[])).build();

        let (a, b, c) =
            tokio::join!(manager.initialize(), manager.initialize(), manager.initialize());

        assert_eq!((a, b, c), (Ok(()), Ok(()), Ok(())));
        assert_eq!(remote.calls(), 1);
        assert_eq!(manager.state(), ManagerState::Ready);
    }

    #[tokio::test]
    async fn test_local_only_without_token() {
        let remote = MockRemote::new(Ok(map(&[("A", "remote")])));
        let local = FixedLocal(LocalLayers {
            files: map(&[("A", "file")]),
            process: HashMap::new(),
        });
        let manager = manager(&remote, local).build();

        manager.initialize().await.unwrap();

        assert_eq!(remote.calls(), 0);
        assert_eq!(manager.state(), ManagerState::Ready);
        assert_eq!(manager.get("A").unwrap().as_deref(), Some("file"));
        let stats = manager.stats();
        assert!(!stats.remote_configured);
        assert_eq!(stats.source, Some(SnapshotSource::LocalFallback));
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back_to_local() {
        let remote = MockRemote::new(Err(401));
        let manager = manager(&remote, with_token(&[("A", "file")])).build();

        manager.initialize().await.unwrap();

        assert_eq!(manager.state(), ManagerState::Degraded);
        assert_eq!(manager.get("A").unwrap().as_deref(), Some("file"));
        let health = manager.health_status();
        assert!(!health.healthy);
        assert!(health.initialized);
        assert_eq!(health.last_error.map(|e| e.kind), Some(ErrorKind::Authentication));
    }

    #[tokio::test]
    async fn test_fetch_failure_without_fallback_is_fatal() {
        let remote = MockRemote::new(Err(503));
        let manager = ConfigManager::builder()
            .settings(ManagerSettings {
                fallback_to_local: false,
                ..settings()
            })
            .remote_source(Arc::clone(&remote))
            .local_source(with_token(&[]))
            .build();

        let err = manager.initialize().await.unwrap_err();

        assert!(matches!(&err, ManagerError::Fetch(e) if e.kind == ErrorKind::ServerError));
        assert_eq!(manager.state(), ManagerState::Uninitialized);
        assert_eq!(manager.health_status().last_error.map(|e| e.http_status), Some(Some(503)));
    }

    #[tokio::test]
    async fn test_invalid_remote_values_fall_back_to_local() {
        let remote = MockRemote::new(Ok(map(&[("MODE", "reckless")])));
        let manager = manager(&remote, with_token(&[("MODE", "safe")]))
            .rule(ValidationRule::required("MODE").one_of(&["safe", "fast"]))
            .build();

        manager.initialize().await.unwrap();

        assert_eq!(manager.state(), ManagerState::Degraded);
        assert_eq!(manager.get("MODE").unwrap().as_deref(), Some("safe"));
        let last_error = manager.health_status().last_error.unwrap();
        assert_eq!(last_error.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_validation_failure_lists_every_violation() {
        let remote = MockRemote::new(Ok(map(&[])));
        let manager = manager(&remote, with_token(&[]))
            .rules([ValidationRule::required("DATABASE_URL"), ValidationRule::required("API_KEY")])
            .build();

        let err = manager.initialize().await.unwrap_err();

        match &err {
            ManagerError::Validation { errors } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("'DATABASE_URL'"));
        assert!(message.contains("'API_KEY'"));
        assert_eq!(manager.state(), ManagerState::Uninitialized);
        assert!(manager.get("A").is_err());
    }

    #[tokio::test]
    async fn test_refresh_publishes_new_snapshot() {
        let remote = MockRemote::new(Ok(map(&[("A", "1")])));
        let manager = manager(&remote, with_token(&[])).build();
        manager.initialize().await.unwrap();
        let before = manager.get_all().unwrap();

        remote.set(Ok(map(&[("A", "2")])));
        manager.refresh().await.unwrap();

        assert_eq!(remote.calls(), 2);
        assert_eq!(manager.get("A").unwrap().as_deref(), Some("2"));
        assert_eq!(before["A"], "1");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_snapshot_and_degrades() {
        let remote = MockRemote::new(Ok(map(&[("A", "1")])));
        let manager = ConfigManager::builder()
            .settings(ManagerSettings {
                cache_enabled: false,
                ..settings()
            })
            .remote_source(Arc::clone(&remote))
            .local_source(with_token(&[]))
            .build();
        manager.initialize().await.unwrap();

        remote.set(Err(500));
        manager.refresh().await.unwrap();

        assert_eq!(manager.state(), ManagerState::Degraded);
        assert_eq!(manager.get("A").unwrap().as_deref(), Some("1"));
        assert!(!manager.health_status().healthy);

        remote.set(Ok(map(&[("A", "3")])));
        manager.refresh().await.unwrap();
        assert_eq!(manager.state(), ManagerState::Ready);
        assert!(manager.health_status().healthy);
        assert!(manager.health_status().last_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_without_fallback_propagates() {
        let remote = MockRemote::new(Ok(map(&[("A", "1")])));
        let manager = ConfigManager::builder()
            .settings(ManagerSettings {
                cache_enabled: false,
                fallback_to_local: false,
                ..settings()
            })
            .remote_source(Arc::clone(&remote))
            .local_source(with_token(&[]))
            .build();
        manager.initialize().await.unwrap();

        remote.set(Err(403));
        let err = manager.refresh().await.unwrap_err();

        assert!(matches!(err, ManagerError::Fetch(ref e) if e.kind == ErrorKind::Authentication));
        assert_eq!(manager.state(), ManagerState::Ready);
        assert_eq!(manager.get("A").unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_destroy_then_initialize_fetches_again() {
        let remote = MockRemote::new(Ok(map(&[("A", "1")])));
        let manager = manager(&remote, with_token(&[])).build();
        manager.initialize().await.unwrap();

        manager.destroy();
        assert_eq!(manager.state(), ManagerState::Uninitialized);
        assert!(manager.get("A").is_err());

        manager.initialize().await.unwrap();
        assert_eq!(remote.calls(), 2);
        assert_eq!(manager.state(), ManagerState::Ready);
    }

    #[tokio::test]
    async fn test_background_refresh_after_ttl() {
        let remote = MockRemote::new(Ok(map(&[("A", "1")])));
        let manager = ConfigManager::builder()
            .settings(ManagerSettings {
                background_refresh: true,
                cache_ttl_ms: 20,
                ..settings()
            })
            .remote_source(Arc::clone(&remote))
            .local_source(with_token(&[]))
            .build();
        manager.initialize().await.unwrap();

        remote.set(Ok(map(&[("A", "2")])));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(manager.get("A").unwrap().as_deref(), Some("1"));

        for _ in 0..100 {
            if manager.get("A").unwrap().as_deref() == Some("2") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.get("A").unwrap().as_deref(), Some("2"));
        assert!(remote.calls() >= 2);
    }

    #[tokio::test]
    async fn test_health_provider() {
        let remote = MockRemote::new(Err(503));
        let manager = manager(&remote, with_token(&[("A", "1")])).build();

        let check = manager.health_check().await;
        assert!(matches!(check.status, HealthStatus::Unhealthy { .. }));

        manager.initialize().await.unwrap();
        let check = manager.health_check().await;
        assert!(matches!(check.status, HealthStatus::Degraded { .. }));
        assert_eq!(check.metadata.get("state"), Some(&"degraded".to_string()));
        assert_eq!(check.metadata.get("source"), Some(&"local_fallback".to_string()));

        remote.set(Ok(map(&[])));
        manager.refresh().await.unwrap();
        assert!(manager.health_check().await.status.is_healthy());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_values_and_token_are_not_logged() {
        let remote = MockRemote::new(Ok(map(&[("DB_PASSWORD", "hunter2-remote")])));
        let local = FixedLocal(LocalLayers {
            files: map(&[(ACCESS_TOKEN_KEY, "tok-should-not-appear")]),
            process: HashMap::new(),
        });
        let manager = manager(&remote, local).build();

        manager.initialize().await.unwrap();

        assert!(logs_contain("Published configuration snapshot"));
        assert!(!logs_contain("tok-should-not-appear"));
        assert!(!logs_contain("hunter2-remote"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ManagerError::Validation {
            errors: vec!["first".into(), "second".into()],
        };
        assert_eq!(err.to_string(), "configuration validation failed:\n  - first\n  - second");
        assert_eq!(err.to_config_error().kind, ErrorKind::Validation);
    }
}
