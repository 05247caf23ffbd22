//! Test doubles for the store and cache contracts.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cachet::cache::{Cache, CacheError, MemoryCache};
use cachet::database::{Record, Store, StoreError};
use serde_json::json;

pub fn sample_records() -> Vec<Record> {
    vec![
        json!({ "id": 1, "department": "cs", "marks": 80 }),
        json!({ "id": 2, "department": "cs", "marks": 91 }),
        json!({ "id": 3, "department": "ee", "marks": 70 }),
    ]
}

/// Store that serves a fixed collection and counts queries.
#[derive(Default)]
pub struct CountingStore {
    records: Vec<Record>,
    queries: AtomicUsize,
    failing: AtomicBool,
    rejecting: AtomicBool,
    delay: Duration,
}

impl CountingStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Every query sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Queries reach the store but fail, as a bad query would.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn query_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "connection refused".to_owned(),
            });
        }
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(StoreError::Query {
                collection: collection.to_owned(),
                message: "unknown operator $grup".to_owned(),
            });
        }
        Ok(self.records.clone())
    }
}

/// In-process cache whose reads and writes can be made to fail.
#[derive(Default)]
pub struct FlakyCache {
    inner: MemoryCache,
    failing_gets: AtomicBool,
    failing_sets: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing_gets(&self, failing: bool) {
        self.failing_gets.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_sets(&self, failing: bool) {
        self.failing_sets.store(failing, Ordering::SeqCst);
    }

    /// Write attempts, successful or not.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Stores `raw` directly, bypassing the write counter.
    pub async fn put_raw(&self, key: &str, raw: &'static [u8]) {
        self.inner
            .set_with_expiry(key, Bytes::from_static(raw), Duration::from_secs(600))
            .await
            .unwrap();
    }

    pub async fn peek(&self, key: &str) -> Option<Bytes> {
        self.inner.get(key).await.unwrap()
    }
}

#[async_trait]
impl Cache for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        if self.failing_gets.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable {
                message: "read timed out".to_owned(),
            });
        }
        self.inner.get(key).await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing_sets.load(Ordering::SeqCst) {
            return Err(CacheError::Write {
                key: key.to_owned(),
                message: "OOM command not allowed".to_owned(),
            });
        }
        self.inner.set_with_expiry(key, value, ttl).await
    }
}
