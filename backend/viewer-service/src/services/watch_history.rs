/// Per-user watch history ledger
///
/// Each view moves the video to the front of the user's history, which is
/// capped and duplicate-free. The store performs the move-to-front as one
/// guarded write; a write that loses a race is retried once with a fresh read
/// before `Conflict` is surfaced.
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::UserStore;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::DEFAULT_WATCH_HISTORY_CAPACITY;
use crate::utils::with_deadline;

#[derive(Clone)]
pub struct WatchHistoryLedger {
    users: Arc<dyn UserStore>,
    capacity: usize,
    store_timeout: Duration,
}

impl WatchHistoryLedger {
    pub fn new(users: Arc<dyn UserStore>, capacity: usize, store_timeout: Duration) -> Self {
        Self {
            users,
            capacity: if capacity == 0 {
                DEFAULT_WATCH_HISTORY_CAPACITY
            } else {
                capacity
            },
            store_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a view and return the resulting history, most recent first.
    pub async fn record_view(&self, user_id: Uuid, video_id: Uuid) -> Result<Vec<Uuid>> {
        let outcome = match self.write(user_id, video_id).await {
            Err(AppError::Conflict(_)) => {
                debug!(user_id = %user_id, video_id = %video_id, "Retrying watch history write");
                metrics::record_history_write("retried");
                self.write(user_id, video_id).await
            }
            other => other,
        };

        match outcome {
            Ok(history) => {
                metrics::record_history_write("success");
                Ok(history)
            }
            Err(e) => {
                warn!(user_id = %user_id, video_id = %video_id, error = %e, "Watch history write failed");
                metrics::record_history_write("failed");
                Err(e)
            }
        }
    }

    /// Current history, most recent first.
    pub async fn history(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        with_deadline(
            self.store_timeout,
            "read watch history",
            self.users.watch_history(user_id),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    async fn write(&self, user_id: Uuid, video_id: Uuid) -> Result<Vec<Uuid>> {
        with_deadline(
            self.store_timeout,
            "record watch",
            self.users.record_watch(user_id, video_id, self.capacity),
        )
        .await
    }
}
