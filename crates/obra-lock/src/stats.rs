//! Lock client statistics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of the client counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStats {
    /// Calls to `acquire`, not individual remote attempts
    pub acquire_calls: u64,
    /// Locks granted by the remote service
    pub remote_grants: u64,
    /// Attempts that found the resource held and backed off
    pub contention_retries: u64,
    /// Acquires that gave up after their timeout
    pub timeouts: u64,
    /// Acquires that failed on transport or protocol errors
    pub acquire_errors: u64,
    /// Locks granted by local-fallback mode
    pub fallback_grants: u64,
    /// Local-fallback acquires refused because the resource was held here
    pub fallback_denials: u64,
    /// Releases that returned true
    pub releases: u64,
    /// Releases that returned false
    pub failed_releases: u64,
    /// Entries dropped by their local TTL timer
    pub local_expiries: u64,
    /// Locks currently recorded in the local registry
    pub held: u64,
}

#[derive(Default)]
pub(crate) struct LockStatsCollector {
    pub(crate) acquire_calls: AtomicU64,
    pub(crate) remote_grants: AtomicU64,
    pub(crate) contention_retries: AtomicU64,
    pub(crate) timeouts: AtomicU64,
    pub(crate) acquire_errors: AtomicU64,
    pub(crate) fallback_grants: AtomicU64,
    pub(crate) fallback_denials: AtomicU64,
    pub(crate) releases: AtomicU64,
    pub(crate) failed_releases: AtomicU64,
    pub(crate) local_expiries: AtomicU64,
}

impl LockStatsCollector {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, held: usize) -> LockStats {
        LockStats {
            acquire_calls: self.acquire_calls.load(Ordering::Relaxed),
            remote_grants: self.remote_grants.load(Ordering::Relaxed),
            contention_retries: self.contention_retries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            acquire_errors: self.acquire_errors.load(Ordering::Relaxed),
            fallback_grants: self.fallback_grants.load(Ordering::Relaxed),
            fallback_denials: self.fallback_denials.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            failed_releases: self.failed_releases.load(Ordering::Relaxed),
            local_expiries: self.local_expiries.load(Ordering::Relaxed),
            held: held as u64,
        }
    }
}
