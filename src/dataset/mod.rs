//! Cache-aside dataset reads.
//!
//! [`CacheAside::get_dataset`] serves a registered dataset from the cache when
//! it can and from the store when it must, repopulating the cache on the way
//! out. The cache is an optimization: any cache fault degrades to a store
//! read, and only store faults fail the request.
//!
//! Concurrent misses on the same key are not coalesced. Each one queries the
//! store and writes the cache; the writes are whole-value replacements, so the
//! last one wins and readers never see a partial entry. Entries are not
//! invalidated when the store changes, so a hit can be up to one TTL stale.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheKey};
use crate::database::{Record, Store, StoreError};

/// Default lifetime of a cache entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Errors that fail a dataset read.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("no dataset is registered under cache key `{0}`")]
    UnknownDataset(CacheKey),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a [`Lookup`] was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Store,
}

impl Source {
    /// `HIT` or `MISS`, as reported in the `X-Cache` response header.
    pub fn as_header_value(self) -> &'static str {
        match self {
            Source::Cache => "HIT",
            Source::Store => "MISS",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Cache => "cache",
            Source::Store => "store",
        })
    }
}

/// A dataset read result.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub records: Vec<Record>,
    pub source: Source,
}

/// Cache-aside reader over an injected store and cache.
///
/// Holds no mutable state, so one instance can be shared across every
/// request task behind an `Arc`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use cachet::cache::{CacheKey, MemoryCache};
/// use cachet::database::MemoryStore;
/// use cachet::dataset::{CacheAside, Source};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::new();
/// store.insert_many("documents", [serde_json::json!({ "id": 1 })]).await;
///
/// let key = CacheKey::new("data").unwrap();
/// let datasets = CacheAside::new(Arc::new(store), Arc::new(MemoryCache::new()))
///     .register(key.clone(), "documents");
///
/// assert_eq!(datasets.get_dataset(&key).await.unwrap().source, Source::Store);
/// assert_eq!(datasets.get_dataset(&key).await.unwrap().source, Source::Cache);
/// # }
/// ```
pub struct CacheAside {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
    collections: HashMap<CacheKey, String>,
}

impl CacheAside {
    /// Creates a reader with [`DEFAULT_TTL`] and no registered datasets.
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>) -> Self {
        Self {
            store,
            cache,
            ttl: DEFAULT_TTL,
            collections: HashMap::new(),
        }
    }

    /// Sets the lifetime of entries written on a miss.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Serves `key` from the store collection `collection`.
    #[must_use]
    pub fn register(mut self, key: CacheKey, collection: impl Into<String>) -> Self {
        self.collections.insert(key, collection.into());
        self
    }

    /// Reads the dataset registered under `key`.
    ///
    /// 1. Probe the cache. A readable entry is returned as-is.
    /// 2. Otherwise query the store, write the result to the cache with the
    ///    configured TTL, and return it.
    ///
    /// A cache that is unreachable, or holds bytes that are not a JSON array,
    /// counts as a miss. A failed cache write is logged and the fetched data is
    /// still returned.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::UnknownDataset`]: `key` was never registered.
    /// - [`DatasetError::Store`]: the store was unavailable or the query
    ///   failed; nothing is written to the cache.
    pub async fn get_dataset(&self, key: &CacheKey) -> Result<Lookup, DatasetError> {
        let collection = self
            .collections
            .get(key)
            .ok_or_else(|| DatasetError::UnknownDataset(key.clone()))?;

        match self.cache.get(key.as_str()).await {
            Ok(Some(payload)) => match serde_json::from_slice::<Vec<Record>>(&payload) {
                Ok(records) => {
                    debug!(key = %key, records = records.len(), "cache hit");
                    return Ok(Lookup {
                        records,
                        source: Source::Cache,
                    });
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "malformed cache entry, reading from store");
                }
            },
            Ok(None) => debug!(key = %key, "cache miss"),
            Err(e) => warn!(key = %key, error = %e, "cache probe failed, reading from store"),
        }

        let records = self.store.query_all(collection).await?;
        debug!(key = %key, collection = %collection, records = records.len(), "fetched from store");

        self.populate(key, &records).await;

        Ok(Lookup {
            records,
            source: Source::Store,
        })
    }

    // Best-effort write; failures never reach the caller.
    async fn populate(&self, key: &CacheKey, records: &[Record]) {
        let payload = match serde_json::to_vec(records) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                warn!(key = %key, error = %e, "could not serialize records for cache");
                return;
            }
        };

        if let Err(e) = self
            .cache
            .set_with_expiry(key.as_str(), payload, self.ttl)
            .await
        {
            warn!(key = %key, error = %e, "cache write failed, serving uncached result");
        }
    }
}

impl fmt::Debug for CacheAside {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheAside")
            .field("ttl", &self.ttl)
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}
