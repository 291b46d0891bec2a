//! Time-windowed key/value cache collaborators.
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryWindowedCache;
pub use self::redis::RedisWindowedCache;

pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache call timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait WindowedCache: Send + Sync {
    async fn get_if_present(&self, key: &str) -> CacheResult<Option<String>>;

    /// Create or overwrite `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Create `key` only if no unexpired entry exists. Returns `true` if this
    /// call created it.
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool>;

    /// Returns `true` if an entry was removed.
    async fn remove(&self, key: &str) -> CacheResult<bool>;
}
