/// Deadlines for calls that leave the process
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{AppError, Result};

/// Run a fallible store or cache call under `duration`.
///
/// An elapsed deadline becomes `AppError::Timeout` tagged with `operation`;
/// the call's own error is converted through `Into<AppError>`.
pub async fn with_deadline<F, T, E>(
    duration: Duration,
    operation: &'static str,
    future: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<AppError>,
{
    match timeout(duration, future).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!(operation, timeout_ms = duration.as_millis() as u64, "call timed out");
            Err(AppError::Timeout {
                operation,
                after: duration,
            })
        }
    }
}
