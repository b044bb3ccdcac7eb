//! Lock client
//!
//! [`LockClient`] acquires named, TTL-bounded locks from the lock service,
//! retries contended resources with a fixed back-off until a timeout, and keeps
//! a local registry of what it holds. When the service's lock routes are
//! missing it degrades to local-fallback mode, where locks are exclusive only
//! inside this client; [`LockClient::mode`] reports which guarantee is active.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::LockClientConfig;
use crate::constants::{CONTENDED_MESSAGE, LOCAL_TOKEN_PREFIX, LOCALLY_HELD_MESSAGE};
use crate::error::{LockError, Result};
use crate::model::{
    AcquireOptions, AcquireOutcome, AcquireRequest, LockMode, ReleaseRequest, duration_millis,
};
use crate::registry::LocalRegistry;
use crate::stats::{LockStats, LockStatsCollector};
use crate::transport::{HttpLockTransport, LockTransport};

/// Client for the distributed lock service
///
/// Cloning is cheap; clones share the registry, owner id, mode and counters.
#[derive(Clone)]
pub struct LockClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: LockClientConfig,
    transport: Arc<dyn LockTransport>,
    owner_id: String,
    registry: LocalRegistry,
    stats: Arc<LockStatsCollector>,
    mode: RwLock<LockMode>,
}

impl LockClient {
    /// Create a client over an arbitrary transport
    pub fn new(config: LockClientConfig, transport: Arc<dyn LockTransport>) -> Self {
        let owner_id = config.owner_id.clone().unwrap_or_else(generate_owner_id);
        let stats = Arc::new(LockStatsCollector::default());

        debug!(owner_id = %owner_id, api_url = %config.api_url, "Lock client created");

        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                owner_id,
                registry: LocalRegistry::new(stats.clone()),
                stats,
                mode: RwLock::new(LockMode::Distributed),
            }),
        }
    }

    /// Create a client talking HTTP to `config.api_url`
    pub fn from_config(config: LockClientConfig) -> Result<Self> {
        let transport = HttpLockTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Create an HTTP client configured from `OBRA_LOCK_*` variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(LockClientConfig::from_env()?)
    }

    pub fn owner_id(&self) -> &str {
        &self.inner.owner_id
    }

    pub fn config(&self) -> &LockClientConfig {
        &self.inner.config
    }

    /// Guarantee observed on the latest exchange with the service
    pub fn mode(&self) -> LockMode {
        *self.inner.mode.read()
    }

    pub fn stats(&self) -> LockStats {
        self.inner.stats.snapshot(self.inner.registry.len())
    }

    /// Whether this client currently records a lock on `resource`
    pub fn is_held(&self, resource: &str) -> bool {
        self.inner.registry.contains(resource)
    }

    pub fn held_resources(&self) -> Vec<String> {
        self.inner.registry.resources()
    }

    pub fn token_for(&self, resource: &str) -> Option<String> {
        self.inner.registry.token(resource)
    }

    /// Time before the local entry for `resource` expires on its own
    pub fn remaining_ttl(&self, resource: &str) -> Option<Duration> {
        self.inner.registry.remaining(resource)
    }

    /// Acquire with the configured default TTL, timeout and owner
    pub async fn acquire(&self, resource: &str) -> AcquireOutcome {
        self.acquire_with(resource, &AcquireOptions::default()).await
    }

    /// Acquire `resource`, retrying while another holder has it
    ///
    /// Never fails with an error: contention past the timeout, transport
    /// failures and invalid input all come back as `acquired: false`.
    pub async fn acquire_with(&self, resource: &str, options: &AcquireOptions) -> AcquireOutcome {
        let inner = &self.inner;
        LockStatsCollector::incr(&inner.stats.acquire_calls);

        let ttl = options.ttl.unwrap_or_else(|| inner.config.default_ttl());
        let timeout = options
            .timeout
            .unwrap_or_else(|| inner.config.default_timeout());

        if resource.is_empty() {
            return self.reject(LockError::InvalidRequest(
                "resource must not be empty".to_string(),
            ));
        }
        if ttl.is_zero() {
            return self.reject(LockError::InvalidRequest(
                "ttl must be greater than zero".to_string(),
            ));
        }

        let request = AcquireRequest {
            resource: resource.to_string(),
            ttl: duration_millis(ttl),
            client_id: options
                .owner_id
                .clone()
                .unwrap_or_else(|| inner.owner_id.clone()),
        };

        let started = Instant::now();
        loop {
            match inner.transport.acquire(&request).await {
                Ok(response) if response.acquired => {
                    self.set_mode(LockMode::Distributed);

                    let Some(token) = response.token else {
                        return self.reject(LockError::InvalidRequest(
                            "lock service granted a lock without a token".to_string(),
                        ));
                    };

                    inner
                        .registry
                        .insert(resource, token.clone(), ttl, LockMode::Distributed);
                    LockStatsCollector::incr(&inner.stats.remote_grants);

                    let expires_in = response
                        .expires_in
                        .map(Duration::from_millis)
                        .unwrap_or(ttl);
                    debug!(
                        resource = %resource,
                        owner = %request.client_id,
                        expires_in_ms = duration_millis(expires_in),
                        "Lock acquired"
                    );
                    return AcquireOutcome::granted(token, expires_in, LockMode::Distributed);
                }
                Ok(_) => {
                    self.set_mode(LockMode::Distributed);

                    if started.elapsed() >= timeout {
                        LockStatsCollector::incr(&inner.stats.timeouts);
                        debug!(
                            resource = %resource,
                            timeout_ms = duration_millis(timeout),
                            "Gave up waiting for lock"
                        );
                        return AcquireOutcome::denied(CONTENDED_MESSAGE, LockMode::Distributed);
                    }

                    LockStatsCollector::incr(&inner.stats.contention_retries);
                    tokio::time::sleep(inner.config.retry_interval()).await;
                }
                Err(e) if e.is_endpoint_not_found() => {
                    warn!(
                        resource = %resource,
                        "Lock service not available, falling back to local-only locking: {}",
                        e
                    );
                    self.set_mode(LockMode::LocalFallback);
                    return self.acquire_local(resource, ttl);
                }
                Err(e) => return self.reject(e),
            }
        }
    }

    /// Release `resource`, using the locally recorded token when none is given
    ///
    /// The local entry is dropped before the service is contacted, so a failed
    /// remote release still leaves this client unlocked; the service-side TTL
    /// reconciles the difference. An explicit token only clears the local
    /// entry it belongs to, never a newer holder's.
    pub async fn release(&self, resource: &str, token: Option<&str>) -> bool {
        let inner = &self.inner;

        let (token, local_mode) = match token {
            Some(token) => (
                token.to_string(),
                inner.registry.remove_if_token(resource, token),
            ),
            None => match inner.registry.remove(resource) {
                Some((token, mode)) => (token, Some(mode)),
                None => {
                    let err = LockError::MissingToken {
                        resource: resource.to_string(),
                    };
                    warn!("Release skipped: {}", err);
                    LockStatsCollector::incr(&inner.stats.failed_releases);
                    return false;
                }
            },
        };

        // locks minted in local-fallback mode have no remote state
        match local_mode {
            Some(LockMode::LocalFallback) => {
                debug!(resource = %resource, "Local lock released");
                LockStatsCollector::incr(&inner.stats.releases);
                return true;
            }
            None if token.starts_with(LOCAL_TOKEN_PREFIX) => {
                debug!(resource = %resource, "Local token no longer held, nothing to release");
                LockStatsCollector::incr(&inner.stats.failed_releases);
                return false;
            }
            _ => {}
        }

        let request = ReleaseRequest {
            resource: resource.to_string(),
            token,
        };

        let released = match inner.transport.release(&request).await {
            Ok(response) => {
                self.set_mode(LockMode::Distributed);
                if response.released {
                    debug!(resource = %resource, "Lock released");
                } else {
                    warn!(resource = %resource, "Lock service refused the release");
                }
                response.released
            }
            Err(e) if e.is_endpoint_not_found() => {
                self.set_mode(LockMode::LocalFallback);
                debug!(resource = %resource, "Lock service not available, local release only");
                true
            }
            Err(e) => {
                warn!(resource = %resource, "Failed to release lock: {}", e);
                false
            }
        };

        if released {
            LockStatsCollector::incr(&inner.stats.releases);
        } else {
            LockStatsCollector::incr(&inner.stats.failed_releases);
        }
        released
    }

    /// Run `critical_section` while holding `resource`
    ///
    /// The section only runs if the lock is acquired; otherwise the call fails
    /// with [`LockError::NotAcquired`]. Once acquired, the lock is released
    /// exactly once on every exit path, including a panic, which is resumed
    /// after the release. A failed release is logged and never replaces the
    /// section's own result.
    pub async fn with_lock<T, E, F, Fut>(
        &self,
        resource: &str,
        options: &AcquireOptions,
        critical_section: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<LockError>,
    {
        let outcome = self.acquire_with(resource, options).await;
        let token = match outcome.token {
            Some(token) if outcome.acquired => token,
            _ => {
                return Err(LockError::NotAcquired {
                    resource: resource.to_string(),
                    reason: outcome
                        .error
                        .unwrap_or_else(|| CONTENDED_MESSAGE.to_string()),
                }
                .into());
            }
        };

        let result = AssertUnwindSafe(async move { critical_section().await })
            .catch_unwind()
            .await;

        if !self.release(resource, Some(&token)).await {
            warn!(
                resource = %resource,
                "Release after critical section failed, lock stays until its TTL lapses"
            );
        }

        match result {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Drop every local entry and cancel its timer without contacting the
    /// service; remote locks stay held until their TTL lapses.
    pub fn clear_all(&self) -> usize {
        let cleared = self.inner.registry.clear();
        if cleared > 0 {
            info!(count = cleared, "Cleared local lock registry");
        }
        cleared
    }

    /// Drop the local entry for `resource` without contacting the service
    pub(crate) fn forget(&self, resource: &str) -> bool {
        self.inner.registry.remove(resource).is_some()
    }

    fn acquire_local(&self, resource: &str, ttl: Duration) -> AcquireOutcome {
        let inner = &self.inner;
        let token = format!("{}_{}", LOCAL_TOKEN_PREFIX, uuid::Uuid::new_v4().simple());

        if inner
            .registry
            .try_insert(resource, token.clone(), ttl, LockMode::LocalFallback)
        {
            LockStatsCollector::incr(&inner.stats.fallback_grants);
            debug!(resource = %resource, "Local lock acquired, no cross-process exclusivity");
            AcquireOutcome::granted(token, ttl, LockMode::LocalFallback)
        } else {
            LockStatsCollector::incr(&inner.stats.fallback_denials);
            debug!(resource = %resource, "Local lock already held");
            AcquireOutcome::denied(LOCALLY_HELD_MESSAGE, LockMode::LocalFallback)
        }
    }

    fn reject(&self, error: LockError) -> AcquireOutcome {
        LockStatsCollector::incr(&self.inner.stats.acquire_errors);
        warn!("Lock acquire failed: {}", error);
        AcquireOutcome::denied(error.to_string(), self.mode())
    }

    fn set_mode(&self, mode: LockMode) {
        let mut current = self.inner.mode.write();
        let previous = *current;
        if previous != mode {
            info!(from = %previous, to = %mode, "Lock mode changed");
            *current = mode;
        }
    }
}

/// `client_<9 random chars>_<unix millis>`
fn generate_owner_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!(
        "client_{}_{}",
        suffix.to_lowercase(),
        chrono::Utc::now().timestamp_millis()
    )
}
