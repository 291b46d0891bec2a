/// Record store collaborators
///
/// The session and engagement services only talk to storage through the
/// `UserStore` and `VideoStore` traits. Two implementations ship:
///
/// - `postgres`: sqlx-backed, used by the binary
/// - `memory`: dashmap-backed, used by tests and local development
///
/// Both implementations make the refresh-token compare-and-set and the
/// watch-history move-to-front atomic per user.
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewUser, User};

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub mod testing;

pub use memory::InMemoryRecordStore;
pub use postgres::PgRecordStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// Optimistic write lost against a concurrent writer
    #[error("concurrent update on {0}")]
    Conflict(String),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate(db_err.constraint().unwrap_or("record").to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    /// Match on either identifier; both are compared lower-cased.
    async fn find_user_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> StoreResult<Option<User>>;

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User>;

    /// Replace the stored refresh-token digest only if it still equals
    /// `expected`. Returns `false` when the stored value moved (or the user
    /// is gone).
    async fn swap_refresh_token(
        &self,
        user_id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> StoreResult<bool>;

    /// Unconditionally clear the stored refresh token. Returns `false` if the
    /// user does not exist.
    async fn clear_refresh_token(&self, user_id: Uuid) -> StoreResult<bool>;

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()>;

    /// Move `video_id` to the front of the user's watch history, capped at
    /// `capacity`, and return the resulting sequence.
    async fn record_watch(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        capacity: usize,
    ) -> StoreResult<Vec<Uuid>>;

    async fn watch_history(&self, user_id: Uuid) -> StoreResult<Option<Vec<Uuid>>>;
}

#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Atomically bump the view counter, returning the new value.
    async fn increment_view_count(&self, video_id: Uuid) -> StoreResult<i64>;

    async fn view_count(&self, video_id: Uuid) -> StoreResult<Option<i64>>;
}
