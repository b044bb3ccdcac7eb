//! Error types for the lock client

/// Errors raised while talking to the lock service or running a locked section
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock routes do not exist on the server; switches the client to
    /// local-fallback mode instead of failing.
    #[error("lock endpoint not found: {path}")]
    EndpointNotFound { path: String },

    #[error("request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid lock request: {0}")]
    InvalidRequest(String),

    #[error("no token known for resource {resource}")]
    MissingToken { resource: String },

    #[error("lock not acquired for {resource}: {reason}")]
    NotAcquired { resource: String, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LockError {
    /// Whether this error means the lock service is absent rather than failing
    pub fn is_endpoint_not_found(&self) -> bool {
        matches!(self, LockError::EndpointNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
