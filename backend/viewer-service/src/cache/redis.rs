use async_trait::async_trait;
use redis::AsyncCommands;
use redis_utils::{with_timeout, RedisCallError, SharedConnectionManager};
use std::time::Duration;
use tracing::error;

use super::{CacheError, CacheResult, WindowedCache};

/// Redis-backed windowed cache; entry expiry is delegated to Redis `EX`.
#[derive(Clone)]
pub struct RedisWindowedCache {
    redis: SharedConnectionManager,
    command_timeout: Duration,
}

impl RedisWindowedCache {
    pub fn new(redis: SharedConnectionManager, command_timeout: Duration) -> Self {
        Self {
            redis,
            command_timeout,
        }
    }
}

fn ttl_secs(ttl: Duration) -> CacheResult<usize> {
    // Redis rejects EX 0
    let secs = ttl.as_secs().max(1);
    usize::try_from(secs)
        .map_err(|_| CacheError::Backend(format!("TTL {}s exceeds platform limits", secs)))
}

impl From<RedisCallError> for CacheError {
    fn from(err: RedisCallError) -> Self {
        match err {
            RedisCallError::Timeout(after) => CacheError::Timeout(after),
            RedisCallError::Command(e) => CacheError::Backend(e.to_string()),
        }
    }
}

#[async_trait]
impl WindowedCache for RedisWindowedCache {
    async fn get_if_present(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.redis.lock().await.clone();
        let value: Option<String> = with_timeout(self.command_timeout, conn.get(key))
            .await
            .map_err(|e| {
                error!("Failed to read cache key {}: {}", key, e);
                CacheError::from(e)
            })?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let ttl = ttl_secs(ttl)?;
        let mut conn = self.redis.lock().await.clone();
        with_timeout(self.command_timeout, async {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
        .map_err(|e| {
            error!("Failed to set cache key {}: {}", key, e);
            CacheError::from(e)
        })
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        let ttl = ttl_secs(ttl)?;
        let mut conn = self.redis.lock().await.clone();

        // SET key value NX EX ttl: nil reply when the key already exists
        let was_set: bool = with_timeout(
            self.command_timeout,
            conn.set_options(
                key,
                value,
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::EX(ttl)),
            ),
        )
        .await
        .map_err(|e| {
            error!("Failed to claim cache key {}: {}", key, e);
            CacheError::from(e)
        })?;

        Ok(was_set)
    }

    async fn remove(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.redis.lock().await.clone();
        let deleted: u32 = with_timeout(self.command_timeout, conn.del(key))
            .await
            .map_err(|e| {
                error!("Failed to delete cache key {}: {}", key, e);
                CacheError::from(e)
            })?;
        Ok(deleted > 0)
    }
}
