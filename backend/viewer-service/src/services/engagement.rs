/// Engagement tracking for video views
///
/// `on_video_viewed` is the single call the video-retrieval path makes. It
/// runs two independent best-effort steps:
///
/// - count the view once per viewer per dedup window
/// - move the video to the front of the viewer's watch history
///
/// Neither step aborts or rolls back the other. Failures are logged and
/// returned in the `ViewReport` instead of as an error.
///
/// When the dedup cache is unreachable the view is counted anyway
/// (fail-open): occasional over-counting is preferred over never counting.
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::VideoStore;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::services::{ViewDedupCache, WatchHistoryLedger};
use crate::utils::{run_detached, with_deadline};

/// Outcome of one view event
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ViewReport {
    /// The video's counter was incremented by this view.
    pub counted: bool,
    /// Counter value after the increment, when one happened.
    pub view_count: Option<i64>,
    /// The dedup cache could not be consulted; the view was counted without it.
    pub dedup_degraded: bool,
    pub count_error: Option<String>,
    /// Watch history after this view, most recent first.
    pub history: Option<Vec<Uuid>>,
    pub history_error: Option<String>,
}

impl ViewReport {
    pub fn is_complete(&self) -> bool {
        self.count_error.is_none() && self.history_error.is_none()
    }
}

#[derive(Debug, Default)]
struct CountOutcome {
    counted: bool,
    view_count: Option<i64>,
    degraded: bool,
    error: Option<String>,
}

#[derive(Clone)]
pub struct EngagementCoordinator {
    dedup: ViewDedupCache,
    history: WatchHistoryLedger,
    videos: Arc<dyn VideoStore>,
    store_timeout: Duration,
}

impl EngagementCoordinator {
    pub fn new(
        dedup: ViewDedupCache,
        history: WatchHistoryLedger,
        videos: Arc<dyn VideoStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            dedup,
            history,
            videos,
            store_timeout,
        }
    }

    pub fn dedup(&self) -> &ViewDedupCache {
        &self.dedup
    }

    pub fn history(&self) -> &WatchHistoryLedger {
        &self.history
    }

    /// Current counter of a video; `NotFound` if it does not exist.
    pub async fn view_count(&self, video_id: Uuid) -> Result<i64> {
        with_deadline(
            self.store_timeout,
            "read view count",
            self.videos.view_count(video_id),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("video {}", video_id)))
    }

    /// Record that `user_id` viewed `video_id`.
    ///
    /// Runs on its own task: a caller that goes away mid-call does not leave
    /// a dedup claim taken without its increment.
    pub async fn on_video_viewed(&self, user_id: Uuid, video_id: Uuid) -> ViewReport {
        let this = self.clone();
        let outcome = run_detached("record video view", async move {
            Ok(this.apply_view(user_id, video_id).await)
        })
        .await;

        match outcome {
            Ok(report) => report,
            Err(e) => {
                let message = e.to_string();
                ViewReport {
                    count_error: Some(message.clone()),
                    history_error: Some(message),
                    ..ViewReport::default()
                }
            }
        }
    }

    async fn apply_view(&self, user_id: Uuid, video_id: Uuid) -> ViewReport {
        let (count, history) = tokio::join!(
            self.count_view(user_id, video_id),
            self.history.record_view(user_id, video_id),
        );

        let (history, history_error) = match history {
            Ok(entries) => (Some(entries), None),
            Err(e) => (None, Some(e.to_string())),
        };

        ViewReport {
            counted: count.counted,
            view_count: count.view_count,
            dedup_degraded: count.degraded,
            count_error: count.error,
            history,
            history_error,
        }
    }

    async fn count_view(&self, user_id: Uuid, video_id: Uuid) -> CountOutcome {
        let degraded = match self.dedup.claim_first_view(user_id, video_id).await {
            Ok(true) => false,
            Ok(false) => {
                metrics::record_view("deduplicated");
                return CountOutcome::default();
            }
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    video_id = %video_id,
                    error = %e,
                    "View dedup cache unavailable, counting view anyway"
                );
                true
            }
        };

        let incremented = with_deadline(
            self.store_timeout,
            "increment view count",
            self.videos.increment_view_count(video_id),
        )
        .await;

        match incremented {
            Ok(view_count) => {
                metrics::record_view(if degraded { "fail_open" } else { "counted" });
                debug!(video_id = %video_id, view_count, "View counted");
                CountOutcome {
                    counted: true,
                    view_count: Some(view_count),
                    degraded,
                    error: None,
                }
            }
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "Failed to increment view count");
                metrics::record_view("failed");
                if !degraded {
                    // Give the claim back so the next view can be counted
                    if let Err(release_err) = self.dedup.release(user_id, video_id).await {
                        warn!(
                            user_id = %user_id,
                            video_id = %video_id,
                            error = %release_err,
                            "Failed to release view dedup claim"
                        );
                    }
                }
                CountOutcome {
                    counted: false,
                    view_count: None,
                    degraded,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
