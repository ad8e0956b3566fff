//! In-memory revocation cache for single-process deployments and tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{CacheError, RevocationCache};

/// How often the cleanup task sweeps lapsed entries.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// `DashMap<token, deadline>`-backed [`RevocationCache`].
pub struct MemoryRevocationCache {
    entries: DashMap<String, Instant>,
}

impl MemoryRevocationCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of entries, lapsed ones included until the next cleanup.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time left on a live entry.
    pub fn remaining(&self, token: &str) -> Option<Duration> {
        self.entries
            .get(token)
            .and_then(|deadline| deadline.checked_duration_since(Instant::now()))
    }

    /// Evict lapsed entries.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.entries.retain(|_, deadline| *deadline > now);
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                cache.cleanup();
                debug!(remaining = cache.len(), "revocation cache swept");
            }
        })
    }
}

impl Default for MemoryRevocationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RevocationCache for MemoryRevocationCache {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(token.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, CacheError> {
        Ok(self
            .entries
            .get(token)
            .is_some_and(|deadline| *deadline > Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoked_token_is_reported() {
        let cache = MemoryRevocationCache::new();
        assert!(!cache.is_revoked("t1").await.unwrap());
        cache.revoke("t1", Duration::from_secs(60)).await.unwrap();
        assert!(cache.is_revoked("t1").await.unwrap());
        assert!(!cache.is_revoked("t2").await.unwrap());
    }

    #[tokio::test]
    async fn lapsed_entry_is_not_revoked_and_gets_swept() {
        let cache = MemoryRevocationCache::new();
        cache.revoke("t1", Duration::ZERO).await.unwrap();
        cache.revoke("t2", Duration::from_secs(60)).await.unwrap();
        assert!(!cache.is_revoked("t1").await.unwrap());

        cache.cleanup();
        assert_eq!(cache.len(), 1);
        assert!(cache.is_revoked("t2").await.unwrap());
    }
}
