//! Redis connection plumbing shared by backend services.
//!
//! Connections are built explicitly at startup through [`RedisPool::connect`]
//! and handed to consumers as a [`SharedConnectionManager`]. Every command
//! issued by a consumer should go through [`with_timeout`] so a stalled
//! server surfaces as [`RedisCallError::Timeout`] instead of hanging a request.
use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::{info, warn};

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Default upper bound for a single Redis round trip.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

/// Failure of a bounded Redis call.
#[derive(Debug, thiserror::Error)]
pub enum RedisCallError {
    #[error("redis command timed out after {0:?}")]
    Timeout(Duration),

    #[error("redis command failed: {0}")]
    Command(#[from] RedisError),
}

/// Owns the connection manager for the lifetime of the process.
pub struct RedisPool {
    manager: SharedConnectionManager,
    url_label: String,
}

impl RedisPool {
    /// Connect to Redis, failing if the initial handshake does not finish
    /// within `connect_timeout`.
    pub async fn connect(redis_url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = Client::open(redis_url).context("failed to parse REDIS_URL connection string")?;
        let url_label = redact_url(redis_url);

        let connection_manager = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .with_context(|| format!("timed out connecting to Redis at {}", url_label))?
            .context("failed to initialize Redis connection manager")?;

        info!(redis = %url_label, "Redis connection manager initialized");

        Ok(Self {
            manager: Arc::new(Mutex::new(connection_manager)),
            url_label,
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }

    /// Round-trip a PING, used by health checks.
    pub async fn ping(&self, timeout: Duration) -> std::result::Result<(), RedisCallError> {
        let mut conn = self.manager.lock().await.clone();
        let _: String = with_timeout(timeout, async {
            redis::cmd("PING").query_async(&mut conn).await
        })
        .await?;
        Ok(())
    }

    /// Release the connection. Outstanding clones of the manager keep working
    /// until they are dropped.
    pub fn shutdown(self) {
        if Arc::strong_count(&self.manager) > 1 {
            warn!(
                redis = %self.url_label,
                "Redis pool shut down while connection manager clones are still alive"
            );
        }
        info!(redis = %self.url_label, "Redis pool closed");
    }
}

/// Run a Redis future with an upper bound on its duration.
pub async fn with_timeout<F, T>(
    duration: Duration,
    future: F,
) -> std::result::Result<T, RedisCallError>
where
    F: Future<Output = std::result::Result<T, RedisError>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result.map_err(RedisCallError::from),
        Err(_) => Err(RedisCallError::Timeout(duration)),
    }
}

/// Strip credentials from a Redis URL before it reaches the logs.
fn redact_url(raw: &str) -> String {
    match (raw.find("://"), raw.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &raw[..scheme_end], &raw[at + 1..])
        }
        _ => raw.to_string(),
    }
}
