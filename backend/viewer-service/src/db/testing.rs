/// Fault-injecting `UserStore` for unit tests
///
/// Delegates to `InMemoryRecordStore` and can be told to lose refresh-token
/// swaps (optionally letting a rival rotation land first), to report
/// watch-history write conflicts, to fail reads, or to stall reads.
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use super::{InMemoryRecordStore, StoreError, StoreResult, UserStore};
use crate::models::{NewUser, User};

#[derive(Default)]
pub struct ScriptedUserStore {
    pub inner: InMemoryRecordStore,
    lost_swaps: AtomicUsize,
    rival_digest: Mutex<Option<String>>,
    watch_conflicts: AtomicUsize,
    fail_reads: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
    pub swap_calls: AtomicUsize,
    pub watch_calls: AtomicUsize,
}

impl ScriptedUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the next `count` swaps as lost.
    pub fn lose_swaps(&self, count: usize) {
        self.lost_swaps.store(count, Ordering::SeqCst);
    }

    /// Before reporting a lost swap, store `digest` as if a concurrent
    /// rotation had won.
    pub fn rival_wins_with(&self, digest: &str) {
        *self.rival_digest.lock().unwrap() = Some(digest.to_string());
    }

    pub fn conflict_watch_writes(&self, count: usize) {
        self.watch_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn delay_reads(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn before_read(&self) -> StoreResult<()> {
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for ScriptedUserStore {
    async fn find_user_by_id(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        self.before_read().await?;
        self.inner.find_user_by_id(user_id).await
    }

    async fn find_user_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> StoreResult<Option<User>> {
        self.before_read().await?;
        self.inner.find_user_by_username_or_email(username, email).await
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        self.inner.create_user(new_user).await
    }

    async fn swap_refresh_token(
        &self,
        user_id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> StoreResult<bool> {
        self.swap_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_one(&self.lost_swaps) {
            let rival = self.rival_digest.lock().unwrap().clone();
            if let Some(digest) = rival {
                self.inner
                    .swap_refresh_token(user_id, expected, Some(&digest))
                    .await?;
            }
            return Ok(false);
        }
        self.inner.swap_refresh_token(user_id, expected, new).await
    }

    async fn clear_refresh_token(&self, user_id: Uuid) -> StoreResult<bool> {
        self.inner.clear_refresh_token(user_id).await
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        self.inner.update_password_hash(user_id, password_hash).await
    }

    async fn record_watch(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        capacity: usize,
    ) -> StoreResult<Vec<Uuid>> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_one(&self.watch_conflicts) {
            return Err(StoreError::Conflict(format!("watch history of user {}", user_id)));
        }
        self.inner.record_watch(user_id, video_id, capacity).await
    }

    async fn watch_history(&self, user_id: Uuid) -> StoreResult<Option<Vec<Uuid>>> {
        self.before_read().await?;
        self.inner.watch_history(user_id).await
    }
}
