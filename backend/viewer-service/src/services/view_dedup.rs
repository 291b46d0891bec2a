use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::cache::WindowedCache;
use crate::error::Result;
use crate::utils::with_deadline;

/// Default suppression window for repeat views: 24 hours.
pub const DEFAULT_VIEW_DEDUP_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

const VIEWED_MARKER: &str = "1";

/// Per-viewer view de-duplication
///
/// Records "user X viewed video Y" as a self-expiring cache entry. While the
/// entry exists, repeat views by the same user are not counted again.
///
/// This is best-effort: if the cache evicts early or is unreachable, a view
/// may be counted more than once per window.
///
/// # Implementation
/// - Key format: `views:dedup:{user_id}:{video_id}`
/// - `claim_first_view` is a single set-if-absent, so two concurrent first
///   views produce exactly one claim
#[derive(Clone)]
pub struct ViewDedupCache {
    cache: Arc<dyn WindowedCache>,
    window: Duration,
    call_timeout: Duration,
}

impl ViewDedupCache {
    pub fn new(cache: Arc<dyn WindowedCache>, window: Duration, call_timeout: Duration) -> Self {
        Self {
            cache,
            window,
            call_timeout,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn key(user_id: Uuid, video_id: Uuid) -> String {
        format!("views:dedup:{}:{}", user_id, video_id)
    }

    /// True if an unexpired entry exists for the pair.
    pub async fn has_viewed(&self, user_id: Uuid, video_id: Uuid) -> Result<bool> {
        let key = Self::key(user_id, video_id);
        let marker = with_deadline(
            self.call_timeout,
            "view dedup lookup",
            self.cache.get_if_present(&key),
        )
        .await?;
        Ok(marker.is_some())
    }

    /// Create or overwrite the entry for the pair. `window` defaults to the
    /// configured dedup window.
    pub async fn mark_viewed(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        window: Option<Duration>,
    ) -> Result<()> {
        let key = Self::key(user_id, video_id);
        let ttl = window.unwrap_or(self.window);
        with_deadline(
            self.call_timeout,
            "view dedup mark",
            self.cache.set_with_ttl(&key, VIEWED_MARKER, ttl),
        )
        .await?;
        debug!(user_id = %user_id, video_id = %video_id, ttl_secs = ttl.as_secs(), "Marked view");
        Ok(())
    }

    /// Check and mark in one atomic step. Returns `true` if this call is the
    /// first view of the pair within the window.
    pub async fn claim_first_view(&self, user_id: Uuid, video_id: Uuid) -> Result<bool> {
        let key = Self::key(user_id, video_id);
        let claimed = with_deadline(
            self.call_timeout,
            "view dedup claim",
            self.cache
                .set_if_absent_with_ttl(&key, VIEWED_MARKER, self.window),
        )
        .await?;

        if !claimed {
            debug!(user_id = %user_id, video_id = %video_id, "View already counted in window");
        }
        Ok(claimed)
    }

    /// Drop the entry so the next view of the pair counts again.
    pub async fn release(&self, user_id: Uuid, video_id: Uuid) -> Result<bool> {
        let key = Self::key(user_id, video_id);
        with_deadline(
            self.call_timeout,
            "view dedup release",
            self.cache.remove(&key),
        )
        .await
    }
}
