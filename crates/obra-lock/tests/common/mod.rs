//! Shared helpers for the lock client integration tests

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use obra_lock::error::Result;
use obra_lock::model::{AcquireRequest, AcquireResponse, ReleaseRequest, ReleaseResponse};
use obra_lock::{LockClient, LockClientConfig, LockError, LockTransport, MemoryLockTransport};
use parking_lot::Mutex;

/// How a route of [`RecordingTransport`] answers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// Delegate to the in-memory lock service
    Serve,
    /// Answer like a server without the lock routes
    NotFound,
    /// Answer with a server error
    Fail,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Acquire { resource: String, client_id: String },
    Release { resource: String, token: String },
}

/// Lock transport that records every call before answering it
pub struct RecordingTransport {
    service: MemoryLockTransport,
    acquire_behavior: Mutex<Behavior>,
    release_behavior: Mutex<Behavior>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingTransport {
    pub fn new(service: MemoryLockTransport) -> Arc<Self> {
        Arc::new(Self {
            service,
            acquire_behavior: Mutex::new(Behavior::Serve),
            release_behavior: Mutex::new(Behavior::Serve),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_acquire(&self, behavior: Behavior) {
        *self.acquire_behavior.lock() = behavior;
    }

    pub fn set_release(&self, behavior: Behavior) {
        *self.release_behavior.lock() = behavior;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn acquire_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Acquire { .. }))
            .count()
    }

    pub fn release_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Release { .. }))
            .count()
    }
}

fn answer_error(behavior: Behavior, path: &str) -> LockError {
    match behavior {
        Behavior::NotFound => LockError::EndpointNotFound {
            path: path.to_string(),
        },
        _ => LockError::RequestFailed {
            status: 500,
            body: "lock backend unavailable".to_string(),
        },
    }
}

#[async_trait]
impl LockTransport for RecordingTransport {
    async fn acquire(&self, request: &AcquireRequest) -> Result<AcquireResponse> {
        self.calls.lock().push(Call::Acquire {
            resource: request.resource.clone(),
            client_id: request.client_id.clone(),
        });
        let behavior = *self.acquire_behavior.lock();
        match behavior {
            Behavior::Serve => self.service.acquire(request).await,
            other => Err(answer_error(other, "/locks/acquire")),
        }
    }

    async fn release(&self, request: &ReleaseRequest) -> Result<ReleaseResponse> {
        self.calls.lock().push(Call::Release {
            resource: request.resource.clone(),
            token: request.token.clone(),
        });
        let behavior = *self.release_behavior.lock();
        match behavior {
            Behavior::Serve => self.service.release(request).await,
            other => Err(answer_error(other, "/locks/release")),
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A client on its own recording transport over `service`
pub fn recording_client(service: &MemoryLockTransport) -> (LockClient, Arc<RecordingTransport>) {
    init_tracing();
    let transport = RecordingTransport::new(service.clone());
    let client = LockClient::new(LockClientConfig::default(), transport.clone());
    (client, transport)
}
