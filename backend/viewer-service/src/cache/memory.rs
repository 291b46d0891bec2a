use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{CacheResult, WindowedCache};

/// Process-local windowed cache.
///
/// Expiry uses `tokio::time::Instant`, so paused-clock tests can move past a
/// window with `tokio::time::advance`. Expired entries are dropped lazily.
#[derive(Default)]
pub struct InMemoryWindowedCache {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemoryWindowedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl WindowedCache for InMemoryWindowedCache {
    async fn get_if_present(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if *expires_at > now {
                return Ok(Some(value.clone()));
            }
        }
        self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().1 > now {
                    Ok(false)
                } else {
                    occupied.insert((value.to_string(), now + ttl));
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert((value.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn remove(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = InMemoryWindowedCache::new();
        cache.set_with_ttl("k", "1", Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get_if_present("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get_if_present("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_reclaims_expired_entry() {
        let cache = InMemoryWindowedCache::new();
        let ttl = Duration::from_secs(10);

        assert!(cache.set_if_absent_with_ttl("k", "1", ttl).await.unwrap());
        assert!(!cache.set_if_absent_with_ttl("k", "1", ttl).await.unwrap());

        tokio::time::advance(ttl).await;
        assert!(cache.set_if_absent_with_ttl("k", "1", ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = InMemoryWindowedCache::new();
        cache.set_with_ttl("short", "1", Duration::from_secs(1)).await.unwrap();
        cache.set_with_ttl("long", "1", Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
