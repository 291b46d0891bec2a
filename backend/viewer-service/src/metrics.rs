/// Prometheus metrics for session and engagement tracking
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};

lazy_static! {
    /// Token pairs issued (labels: reason=issue|refresh)
    pub static ref TOKENS_ISSUED_TOTAL: CounterVec = register_counter_vec!(
        "viewer_token_issued_total",
        "Total number of access/refresh token pairs issued",
        &["reason"]
    )
    .unwrap();

    /// Refresh attempts turned away (labels: reason=invalid|unknown_user|stale|conflict)
    pub static ref REFRESH_REJECTED_TOTAL: CounterVec = register_counter_vec!(
        "viewer_refresh_rejected_total",
        "Total number of rejected refresh token exchanges",
        &["reason"]
    )
    .unwrap();

    /// View events (labels: outcome=counted|deduplicated|fail_open|failed)
    pub static ref VIDEO_VIEWS_TOTAL: CounterVec = register_counter_vec!(
        "viewer_video_views_total",
        "Total number of video view events by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Watch history writes (labels: status=success|retried|failed)
    pub static ref WATCH_HISTORY_WRITES_TOTAL: CounterVec = register_counter_vec!(
        "viewer_watch_history_writes_total",
        "Total number of watch history writes",
        &["status"]
    )
    .unwrap();
}

pub fn record_token_issued(reason: &str) {
    TOKENS_ISSUED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_refresh_rejected(reason: &str) {
    REFRESH_REJECTED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_view(outcome: &str) {
    VIDEO_VIEWS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_history_write(status: &str) {
    WATCH_HISTORY_WRITES_TOTAL.with_label_values(&[status]).inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_recorded_counters() {
        record_view("counted");
        record_refresh_rejected("stale");

        let text = gather_metrics();
        assert!(text.contains("viewer_video_views_total"));
        assert!(text.contains("viewer_refresh_rejected_total"));
    }
}
