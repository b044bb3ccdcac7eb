//! Local registry of locks held by one client
//!
//! Every entry owns a timer task that drops the entry once its TTL has passed.
//! The timer is a defensive mirror of the service-side expiry: it never talks
//! to the service, and it only removes the entry it was started for.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::model::{LockMode, duration_millis};
use crate::stats::LockStatsCollector;

pub(crate) struct HeldLock {
    token: String,
    acquired_at: Instant,
    ttl: Duration,
    mode: LockMode,
    expiry: JoinHandle<()>,
}

pub(crate) struct LocalRegistry {
    entries: Arc<DashMap<String, HeldLock>>,
    stats: Arc<LockStatsCollector>,
}

impl LocalRegistry {
    pub(crate) fn new(stats: Arc<LockStatsCollector>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            stats,
        }
    }

    /// Record a lock, replacing (and disarming) any previous entry
    ///
    /// The timer is armed while the entry guard is held, so it cannot look
    /// for the entry before it is in the map.
    pub(crate) fn insert(&self, resource: &str, token: String, ttl: Duration, mode: LockMode) {
        match self.entries.entry(resource.to_string()) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(self.arm(resource, token, ttl, mode));
                previous.expiry.abort();
                debug!(resource = %resource, "Replaced existing local lock entry");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.arm(resource, token, ttl, mode));
            }
        }
    }

    /// Record a lock only if nothing is held for `resource`
    pub(crate) fn try_insert(
        &self,
        resource: &str,
        token: String,
        ttl: Duration,
        mode: LockMode,
    ) -> bool {
        match self.entries.entry(resource.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(self.arm(resource, token, ttl, mode));
                true
            }
        }
    }

    /// Remove an entry and cancel its timer, returning its token and mode
    pub(crate) fn remove(&self, resource: &str) -> Option<(String, LockMode)> {
        self.entries.remove(resource).map(|(_, held)| {
            held.expiry.abort();
            (held.token, held.mode)
        })
    }

    /// Remove the entry only if it still carries `token`
    pub(crate) fn remove_if_token(&self, resource: &str, token: &str) -> Option<LockMode> {
        self.entries
            .remove_if(resource, |_, held| held.token == token)
            .map(|(_, held)| {
                held.expiry.abort();
                held.mode
            })
    }

    pub(crate) fn token(&self, resource: &str) -> Option<String> {
        self.entries.get(resource).map(|held| held.token.clone())
    }

    pub(crate) fn contains(&self, resource: &str) -> bool {
        self.entries.contains_key(resource)
    }

    /// Time left before the local timer fires
    pub(crate) fn remaining(&self, resource: &str) -> Option<Duration> {
        self.entries
            .get(resource)
            .map(|held| held.ttl.saturating_sub(held.acquired_at.elapsed()))
    }

    pub(crate) fn resources(&self) -> Vec<String> {
        let mut resources: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        resources.sort();
        resources
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Cancel every timer and empty the registry
    pub(crate) fn clear(&self) -> usize {
        let resources: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut cleared = 0;
        for resource in resources {
            if self.remove(&resource).is_some() {
                cleared += 1;
            }
        }
        cleared
    }

    fn arm(&self, resource: &str, token: String, ttl: Duration, mode: LockMode) -> HeldLock {
        let entries = self.entries.clone();
        let stats = self.stats.clone();
        let key = resource.to_string();
        let expected = token.clone();

        let expiry = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let expired = entries
                .remove_if(&key, |_, held| held.token == expected)
                .is_some();
            if expired {
                LockStatsCollector::incr(&stats.local_expiries);
                warn!(
                    resource = %key,
                    ttl_ms = duration_millis(ttl),
                    "Lock TTL elapsed without release, dropping local entry"
                );
            }
        });

        HeldLock {
            token,
            acquired_at: Instant::now(),
            ttl,
            mode,
            expiry,
        }
    }
}

impl Drop for LocalRegistry {
    fn drop(&mut self) {
        for entry in self.entries.iter() {
            entry.value().expiry.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn registry() -> (LocalRegistry, Arc<LockStatsCollector>) {
        let stats = Arc::new(LockStatsCollector::default());
        (LocalRegistry::new(stats.clone()), stats)
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_and_remove() {
        let (registry, _) = registry();
        registry.insert(
            "invoice:create:F001",
            "abc".to_string(),
            Duration::from_secs(30),
            LockMode::Distributed,
        );

        assert!(registry.contains("invoice:create:F001"));
        assert_eq!(registry.token("invoice:create:F001").as_deref(), Some("abc"));
        assert_eq!(
            registry.remove("invoice:create:F001"),
            Some(("abc".to_string(), LockMode::Distributed))
        );
        assert!(registry.remove("invoice:create:F001").is_none());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let (registry, stats) = registry();
        registry.insert(
            "r",
            "t".to_string(),
            Duration::from_millis(500),
            LockMode::Distributed,
        );

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(registry.contains("r"));

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!registry.contains("r"));
        assert_eq!(stats.local_expiries.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_keeps_newer_entry() {
        let (registry, stats) = registry();
        registry.insert(
            "r",
            "old".to_string(),
            Duration::from_millis(100),
            LockMode::Distributed,
        );
        registry.insert(
            "r",
            "new".to_string(),
            Duration::from_millis(1000),
            LockMode::Distributed,
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(registry.token("r").as_deref(), Some("new"));
        assert_eq!(stats.local_expiries.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_if_token_keeps_other_holder() {
        let (registry, _) = registry();
        registry.insert(
            "r",
            "current".to_string(),
            Duration::from_secs(1),
            LockMode::LocalFallback,
        );

        assert!(registry.remove_if_token("r", "stale").is_none());
        assert_eq!(registry.token("r").as_deref(), Some("current"));

        assert_eq!(
            registry.remove_if_token("r", "current"),
            Some(LockMode::LocalFallback)
        );
        assert!(!registry.contains("r"));
        assert!(registry.remove_if_token("missing", "current").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_entry_expires_on_its_own_timer() {
        let (registry, stats) = registry();
        registry.insert(
            "r",
            "old".to_string(),
            Duration::from_millis(1000),
            LockMode::Distributed,
        );
        registry.insert(
            "r",
            "new".to_string(),
            Duration::from_millis(50),
            LockMode::Distributed,
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!registry.contains("r"));
        assert_eq!(stats.local_expiries.load(Ordering::Relaxed), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(stats.local_expiries.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_insert_refuses_held_resource() {
        let (registry, _) = registry();
        assert!(registry.try_insert(
            "r",
            "a".to_string(),
            Duration::from_secs(1),
            LockMode::LocalFallback
        ));
        assert!(!registry.try_insert(
            "r",
            "b".to_string(),
            Duration::from_secs(1),
            LockMode::LocalFallback
        ));
        assert_eq!(registry.token("r").as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_timers() {
        let (registry, stats) = registry();
        for name in ["a", "b", "c"] {
            registry.insert(
                name,
                name.to_string(),
                Duration::from_millis(100),
                LockMode::Distributed,
            );
        }
        assert_eq!(registry.resources(), vec!["a", "b", "c"]);

        assert_eq!(registry.clear(), 3);
        assert_eq!(registry.len(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(stats.local_expiries.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let (registry, _) = registry();
        registry.insert(
            "r",
            "t".to_string(),
            Duration::from_millis(1000),
            LockMode::Distributed,
        );
        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(registry.remaining("r"), Some(Duration::from_millis(600)));
        assert!(registry.remaining("missing").is_none());
    }
}
