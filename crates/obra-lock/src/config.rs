//! Configuration for the lock client
//!
//! Values come from [`LockClientConfig::default`], the `with_*` builders, or the
//! environment (`OBRA_LOCK_*`) through [`LockClientConfig::from_env`].

use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::de::DeserializeOwned;

use crate::constants::{
    DEFAULT_API_URL, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_RETRY_INTERVAL_MS, DEFAULT_TIMEOUT_MS, DEFAULT_TTL_MS, ENV_PREFIX, config_key,
};
use crate::error::Result;

/// Configuration for [`crate::LockClient`] and its HTTP transport
#[derive(Clone, Debug)]
pub struct LockClientConfig {
    /// API origin the lock routes hang off (e.g. "https://erp.example.com/api")
    pub api_url: String,
    /// Bearer token sent with every lock request
    pub access_token: Option<String>,
    /// Fixed owner id; a random one is generated per client when unset
    pub owner_id: Option<String>,
    /// Lock lifetime used when a call does not set one
    pub default_ttl_ms: u64,
    /// Acquire retry budget used when a call does not set one
    pub default_timeout_ms: u64,
    /// Back-off between attempts on a contended resource
    pub retry_interval_ms: u64,
    /// Whole-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for LockClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            owner_id: None,
            default_ttl_ms: DEFAULT_TTL_MS,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl LockClientConfig {
    /// Create a config pointing at the given API origin
    pub fn new(api_url: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Load overrides from `OBRA_LOCK_*` environment variables
    pub fn from_env() -> Result<Self> {
        let source = Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Self::from_config(&source)
    }

    /// Apply every key present in `source` on top of the defaults
    pub fn from_config(source: &Config) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup::<String>(source, config_key::API_URL)? {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        config.access_token = lookup(source, config_key::ACCESS_TOKEN)?;
        config.owner_id = lookup(source, config_key::OWNER_ID)?;
        if let Some(v) = lookup(source, config_key::DEFAULT_TTL_MS)? {
            config.default_ttl_ms = v;
        }
        if let Some(v) = lookup(source, config_key::DEFAULT_TIMEOUT_MS)? {
            config.default_timeout_ms = v;
        }
        if let Some(v) = lookup(source, config_key::RETRY_INTERVAL_MS)? {
            config.retry_interval_ms = v;
        }
        if let Some(v) = lookup(source, config_key::REQUEST_TIMEOUT_MS)? {
            config.request_timeout_ms = v;
        }
        if let Some(v) = lookup(source, config_key::CONNECT_TIMEOUT_MS)? {
            config.connect_timeout_ms = v;
        }

        Ok(config)
    }

    /// Set the bearer token
    pub fn with_access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    /// Pin the owner id instead of generating one
    pub fn with_owner_id(mut self, owner_id: &str) -> Self {
        self.owner_id = Some(owner_id.to_string());
        self
    }

    /// Set default TTL and acquire timeout
    pub fn with_lock_defaults(mut self, ttl_ms: u64, timeout_ms: u64) -> Self {
        self.default_ttl_ms = ttl_ms;
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Set the back-off between contended attempts
    pub fn with_retry_interval(mut self, interval_ms: u64) -> Self {
        self.retry_interval_ms = interval_ms;
        self
    }

    /// Set transport timeouts
    pub fn with_timeouts(mut self, connect_ms: u64, request_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.request_timeout_ms = request_ms;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

fn lookup<T: DeserializeOwned>(source: &Config, key: &str) -> Result<Option<T>> {
    match source.get::<T>(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
