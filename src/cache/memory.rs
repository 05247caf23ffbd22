//! In-process cache backed by a concurrent map.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{Cache, CacheError};

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Single-instance cache: entries live in a [`DashMap`] and expire lazily on
/// read.
///
/// Expiry uses [`tokio::time::Instant`], so paused-clock tests can advance
/// past a TTL without sleeping. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.data.clone())),
            Some(_) => {}
        }

        // Only evict if a concurrent writer hasn't replaced it meanwhile.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            tracing::debug!(key = %key, "evicted expired cache entry");
        }
        Ok(None)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = Entry {
            data: value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_owned(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("data").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get() {
        let cache = MemoryCache::new();
        cache
            .set_with_expiry("data", Bytes::from_static(b"[1,2]"), TTL)
            .await
            .unwrap();
        assert_eq!(
            cache.get("data").await.unwrap(),
            Some(Bytes::from_static(b"[1,2]"))
        );
    }

    #[tokio::test]
    async fn set_replaces_previous_entry() {
        let cache = MemoryCache::new();
        cache.set_with_expiry("data", Bytes::from_static(b"old"), TTL).await.unwrap();
        cache.set_with_expiry("data", Bytes::from_static(b"new"), TTL).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("data").await.unwrap(), Some(Bytes::from_static(b"new")));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = MemoryCache::new();
        cache.set_with_expiry("data", Bytes::from_static(b"[]"), TTL).await.unwrap();

        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        assert!(cache.get("data").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("data").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = MemoryCache::new();
        let other = cache.clone();
        cache.set_with_expiry("data", Bytes::from_static(b"x"), TTL).await.unwrap();
        assert!(other.get("data").await.unwrap().is_some());
    }
}
