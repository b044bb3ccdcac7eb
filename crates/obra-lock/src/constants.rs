// Lock service paths, defaults and configuration keys

pub mod lock_api_path {
    pub const ACQUIRE: &str = "/locks/acquire";
    pub const RELEASE: &str = "/locks/release";
}

/// Default lock lifetime before the service expires it (30 seconds)
pub const DEFAULT_TTL_MS: u64 = 30_000;

/// Default time spent retrying a contended resource (10 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Fixed back-off between acquire attempts on a contended resource
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 200;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000/api";

/// Prefix for environment variables, e.g. `OBRA_LOCK_API_URL`
pub const ENV_PREFIX: &str = "OBRA_LOCK";

pub mod config_key {
    pub const API_URL: &str = "api_url";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const OWNER_ID: &str = "owner_id";
    pub const DEFAULT_TTL_MS: &str = "default_ttl_ms";
    pub const DEFAULT_TIMEOUT_MS: &str = "default_timeout_ms";
    pub const RETRY_INTERVAL_MS: &str = "retry_interval_ms";
    pub const REQUEST_TIMEOUT_MS: &str = "request_timeout_ms";
    pub const CONNECT_TIMEOUT_MS: &str = "connect_timeout_ms";
}

/// Reported when a resource stays held past the acquire timeout
pub const CONTENDED_MESSAGE: &str = "resource locked by another process";

/// Reported when local-fallback mode finds the resource already held here
pub const LOCALLY_HELD_MESSAGE: &str = "resource locked locally";

/// Prefix of tokens minted by local-fallback mode
pub const LOCAL_TOKEN_PREFIX: &str = "local";
