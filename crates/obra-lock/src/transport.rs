//! Transport to the remote lock service
//!
//! [`LockTransport`] is the seam between [`crate::LockClient`] and whatever
//! grants locks. [`HttpLockTransport`] talks JSON over HTTP to
//! `POST /locks/acquire` and `POST /locks/release`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error};

use crate::config::LockClientConfig;
use crate::constants::lock_api_path;
use crate::error::{LockError, Result};
use crate::model::{AcquireRequest, AcquireResponse, ReleaseRequest, ReleaseResponse};

/// Remote side of the lock protocol
///
/// Implementations report a missing lock service as
/// [`LockError::EndpointNotFound`]; the client treats that as a mode switch.
#[async_trait]
pub trait LockTransport: Send + Sync {
    async fn acquire(&self, request: &AcquireRequest) -> Result<AcquireResponse>;

    async fn release(&self, request: &ReleaseRequest) -> Result<ReleaseResponse>;
}

/// JSON-over-HTTP lock transport
pub struct HttpLockTransport {
    client: Client,
    api_url: String,
    access_token: Option<String>,
}

impl HttpLockTransport {
    pub fn new(config: &LockClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.build_url(path);
        debug!("POST {}", url);

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        self.handle_response(path, response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        path: &str,
        response: Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(LockError::EndpointNotFound {
                path: path.to_string(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        error!("Lock request failed with status {}: {}", status, body);
        Err(LockError::RequestFailed {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl LockTransport for HttpLockTransport {
    async fn acquire(&self, request: &AcquireRequest) -> Result<AcquireResponse> {
        self.post_json(lock_api_path::ACQUIRE, request).await
    }

    async fn release(&self, request: &ReleaseRequest) -> Result<ReleaseResponse> {
        self.post_json(lock_api_path::RELEASE, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let config = LockClientConfig::new("http://localhost:3000/api/");
        let transport = HttpLockTransport::new(&config).unwrap();

        assert_eq!(
            transport.build_url(lock_api_path::ACQUIRE),
            "http://localhost:3000/api/locks/acquire"
        );
        assert_eq!(
            transport.build_url(lock_api_path::RELEASE),
            "http://localhost:3000/api/locks/release"
        );
    }

    #[test]
    fn test_access_token_carried() {
        let config = LockClientConfig::new("http://localhost:3000").with_access_token("jwt");
        let transport = HttpLockTransport::new(&config).unwrap();
        assert_eq!(transport.access_token.as_deref(), Some("jwt"));
    }
}
