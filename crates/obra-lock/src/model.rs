//! Lock service wire types and client-facing results

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Body of `POST /locks/acquire`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireRequest {
    pub resource: String,
    /// Lifetime in milliseconds
    pub ttl: u64,
    pub client_id: String,
}

/// Response of `POST /locks/acquire`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireResponse {
    pub acquired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Remaining lifetime in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// Body of `POST /locks/release`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub resource: String,
    pub token: String,
}

/// Response of `POST /locks/release`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResponse {
    pub released: bool,
}

/// Which exclusivity guarantee the client is currently giving
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Locks are granted by the remote service and exclusive across processes
    #[default]
    Distributed,
    /// The lock routes are missing; locks are only exclusive inside this client
    LocalFallback,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Distributed => write!(f, "distributed"),
            LockMode::LocalFallback => write!(f, "local-fallback"),
        }
    }
}

/// Per-call acquire parameters; unset fields use the client defaults
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcquireOptions {
    pub ttl: Option<Duration>,
    pub timeout: Option<Duration>,
    pub owner_id: Option<String>,
}

impl AcquireOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }
}

/// Terminal result of an acquire; failures are values, not errors
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcquireOutcome {
    pub acquired: bool,
    pub token: Option<String>,
    pub expires_in: Option<Duration>,
    pub error: Option<String>,
    /// Guarantee in effect when this outcome was produced
    pub mode: LockMode,
}

impl AcquireOutcome {
    pub fn granted(token: String, expires_in: Duration, mode: LockMode) -> Self {
        Self {
            acquired: true,
            token: Some(token),
            expires_in: Some(expires_in),
            error: None,
            mode,
        }
    }

    pub fn denied(error: impl Into<String>, mode: LockMode) -> Self {
        Self {
            acquired: false,
            token: None,
            expires_in: None,
            error: Some(error.into()),
            mode,
        }
    }

    pub fn is_local(&self) -> bool {
        self.mode == LockMode::LocalFallback
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
