//! Caching layer: the key/value contract the cache-aside read path depends
//! on, and its backends.
//!
//! - [`MemoryCache`]: in-process map with per-entry expiry.
//! - `RedisCache`: Redis over a connection pool (cargo feature `redis`).
//!
//! Every backend must make [`Cache::set_with_expiry`] a single atomic
//! replace: a reader sees either the previous entry, no entry, or the whole
//! new one.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

mod memory;
#[cfg(feature = "redis")]
mod redis_cache;

pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

/// Errors surfaced by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or timed out.
    #[error("cache unavailable: {message}")]
    Unavailable { message: String },

    /// The backend was reached but refused the write.
    #[error("cache write for `{key}` failed: {message}")]
    Write { key: String, message: String },
}

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Reads the payload stored under `key`, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Stores `value` under `key`, replacing any existing entry, expiring
    /// after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: Bytes, ttl: Duration)
    -> Result<(), CacheError>;
}

/// Name of one cached dataset. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

/// Returned by [`CacheKey::new`] for an empty or blank key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cache key must not be empty")]
pub struct EmptyCacheKey;

impl CacheKey {
    /// ```
    /// use cachet::cache::CacheKey;
    ///
    /// assert_eq!(CacheKey::new("data").unwrap().as_str(), "data");
    /// assert!(CacheKey::new("  ").is_err());
    /// ```
    pub fn new(key: impl Into<String>) -> Result<Self, EmptyCacheKey> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(EmptyCacheKey);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
