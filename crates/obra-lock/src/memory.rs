// In-process lock service
// Grants at most one holder per resource with automatic expiry, speaking the
// same request/response types as the remote service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::model::{
    AcquireRequest, AcquireResponse, ReleaseRequest, ReleaseResponse, duration_millis,
};
use crate::transport::LockTransport;

/// A granted lock entry
struct LockEntry {
    owner: String,
    token: String,
    acquired_at: Instant,
    ttl: Duration,
}

impl LockEntry {
    fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() >= self.ttl
    }

    fn remaining(&self) -> Duration {
        self.ttl.saturating_sub(self.acquired_at.elapsed())
    }
}

/// Lock service kept in memory, usable wherever a [`LockTransport`] is expected
///
/// Clones share the same lock table, so several clients built on clones of one
/// `MemoryLockTransport` contend with each other like processes sharing a
/// remote service.
#[derive(Clone, Default)]
pub struct MemoryLockTransport {
    locks: Arc<DashMap<String, LockEntry>>,
}

impl MemoryLockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current owner of a resource, ignoring expired entries
    pub fn holder(&self, resource: &str) -> Option<String> {
        self.locks
            .get(resource)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.owner.clone())
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, entry| !entry.is_expired());
        let removed = before - self.locks.len();
        if removed > 0 {
            debug!(count = removed, "Cleaned up expired lock entries");
        }
        removed
    }

    /// Number of live locks
    pub fn active_count(&self) -> usize {
        self.locks.iter().filter(|entry| !entry.is_expired()).count()
    }
}

#[async_trait]
impl LockTransport for MemoryLockTransport {
    async fn acquire(&self, request: &AcquireRequest) -> Result<AcquireResponse> {
        let ttl = Duration::from_millis(request.ttl);

        let token = uuid::Uuid::new_v4().simple().to_string();
        let entry = LockEntry {
            owner: request.client_id.clone(),
            token: token.clone(),
            acquired_at: Instant::now(),
            ttl,
        };

        match self.locks.entry(request.resource.clone()) {
            Entry::Occupied(existing) if !existing.get().is_expired() => {
                debug!(
                    resource = %request.resource,
                    holder = %existing.get().owner,
                    "Lock busy"
                );
                return Ok(AcquireResponse {
                    acquired: false,
                    token: None,
                    expires_in: Some(duration_millis(existing.get().remaining())),
                });
            }
            Entry::Occupied(mut expired) => {
                expired.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }

        debug!(resource = %request.resource, owner = %request.client_id, "Lock acquired");
        Ok(AcquireResponse {
            acquired: true,
            token: Some(token),
            expires_in: Some(request.ttl),
        })
    }

    async fn release(&self, request: &ReleaseRequest) -> Result<ReleaseResponse> {
        let released = self
            .locks
            .remove_if(&request.resource, |_, entry| {
                entry.token == request.token && !entry.is_expired()
            })
            .is_some();

        if released {
            debug!(resource = %request.resource, "Lock released");
        }
        Ok(ReleaseResponse { released })
    }
}
