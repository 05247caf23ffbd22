//! Redis cache client over a `deadpool-redis` connection pool.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;

use super::{Cache, CacheError};

/// Upper bound on acquiring a connection and on each command. A Redis that
/// stops answering turns into `CacheError`s within this window.
pub const OPERATION_TIMEOUT: Duration = Duration::from_millis(500);

fn pool_config(pool_size: usize) -> PoolConfig {
    let mut config = PoolConfig::new(pool_size);
    config.timeouts.wait = Some(OPERATION_TIMEOUT);
    config.timeouts.create = Some(OPERATION_TIMEOUT);
    config.timeouts.recycle = Some(OPERATION_TIMEOUT);
    config
}

fn timed_out(op: &str) -> String {
    format!("{op} timed out after {OPERATION_TIMEOUT:?}")
}

/// Cache client for a shared Redis instance.
///
/// Writes use `SETEX`, which replaces the value and its expiry in one
/// command. Expiry is truncated to whole seconds, with a floor of one.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Builds a pool for `url` and checks that one connection can be made.
    pub async fn connect(url: &str, pool_size: usize) -> Result<Self, CacheError> {
        let mut config = Config::from_url(url);
        config.pool = Some(pool_config(pool_size));
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Unavailable {
                message: e.to_string(),
            })?;

        pool.get().await.map_err(|e| CacheError::Unavailable {
            message: e.to_string(),
        })?;
        tracing::info!(url = %url, "connected to Redis");
        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool.get().await.map_err(|e| CacheError::Unavailable {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = tokio::time::timeout(OPERATION_TIMEOUT, conn.get(key))
            .await
            .map_err(|_| CacheError::Unavailable {
                message: timed_out("GET"),
            })?
            .map_err(|e| CacheError::Unavailable {
                message: e.to_string(),
            })?;
        Ok(value.map(Bytes::from))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let seconds = ttl.as_secs().max(1);
        tokio::time::timeout(
            OPERATION_TIMEOUT,
            conn.set_ex::<_, _, ()>(key, &value[..], seconds),
        )
        .await
        .map_err(|_| CacheError::Unavailable {
            message: timed_out("SETEX"),
        })?
        .map_err(|e| CacheError::Write {
            key: key.to_owned(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_bounds_every_wait() {
        let config = pool_config(4);
        assert_eq!(config.max_size, 4);
        assert_eq!(config.timeouts.wait, Some(OPERATION_TIMEOUT));
        assert_eq!(config.timeouts.create, Some(OPERATION_TIMEOUT));
        assert_eq!(config.timeouts.recycle, Some(OPERATION_TIMEOUT));
    }

    #[tokio::test]
    async fn unreachable_server_fails_fast() {
        // Non-routable address: the TCP connect never completes on its own.
        let attempt = tokio::time::timeout(
            Duration::from_secs(5),
            RedisCache::connect("redis://10.255.255.1:6379", 1),
        )
        .await
        .expect("connect should give up within the pool timeout");
        assert!(matches!(attempt, Err(CacheError::Unavailable { .. })));
    }
}
