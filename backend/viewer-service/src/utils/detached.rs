/// Writes that must finish once started
///
/// A request handler's future is dropped when the client disconnects. Running
/// a mutation on its own task means the write (and its paired follow-up, such
/// as releasing a dedup claim) completes or fails as a unit regardless.
use std::future::Future;
use tracing::error;

use crate::error::{AppError, Result};

pub async fn run_detached<F, T>(operation: &'static str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(future).await {
        Ok(result) => result,
        Err(join_err) => {
            error!(operation, error = %join_err, "detached write task failed");
            Err(AppError::Internal(format!("{} aborted", operation)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_returns_task_result() {
        let value = run_detached("add", async { Ok(2 + 2) }).await.unwrap();
        assert_eq!(value, 4);
    }

    #[tokio::test]
    async fn test_write_survives_dropped_caller() {
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();

        let caller = run_detached("slow write", async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        // Poll once so the task is spawned, then drop the caller
        let _ = tokio::time::timeout(Duration::from_millis(1), caller).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_task_maps_to_internal() {
        let result: Result<()> = run_detached("boom", async { panic!("boom") }).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
