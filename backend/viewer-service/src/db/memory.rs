/// In-process record store
///
/// Each user and video lives in its own dashmap entry; mutations happen while
/// holding that entry's write guard, which gives the same per-record atomicity
/// the Postgres store gets from row locks.
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{StoreError, StoreResult, UserStore, VideoStore};
use crate::models::{NewUser, User, WatchHistory};

#[derive(Default)]
pub struct InMemoryRecordStore {
    users: DashMap<Uuid, User>,
    videos: DashMap<Uuid, i64>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a video with zero views.
    pub fn insert_video(&self, video_id: Uuid) {
        self.videos.entry(video_id).or_insert(0);
    }

    pub fn remove_user(&self, user_id: Uuid) -> bool {
        self.users.remove(&user_id).is_some()
    }
}

#[async_trait]
impl UserStore for InMemoryRecordStore {
    async fn find_user_by_id(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn find_user_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> StoreResult<Option<User>> {
        let username = username.map(str::to_lowercase);
        let email = email.map(str::to_lowercase);

        let found = self.users.iter().find(|entry| {
            let user = entry.value();
            username.as_deref() == Some(user.username.as_str())
                || email.as_deref() == Some(user.email.as_str())
        });

        Ok(found.map(|entry| entry.value().clone()))
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let username = new_user.username.to_lowercase();
        let email = new_user.email.to_lowercase();

        if self
            .users
            .iter()
            .any(|entry| entry.username == username || entry.email == email)
        {
            return Err(StoreError::Duplicate("user".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username,
            email,
            full_name: new_user.full_name,
            password_hash: new_user.password_hash,
            refresh_token_hash: None,
            watch_history: Vec::new(),
            watch_history_version: 0,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn swap_refresh_token(
        &self,
        user_id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> StoreResult<bool> {
        let Some(mut user) = self.users.get_mut(&user_id) else {
            return Ok(false);
        };

        if user.refresh_token_hash.as_deref() != expected {
            return Ok(false);
        }

        user.refresh_token_hash = new.map(str::to_string);
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn clear_refresh_token(&self, user_id: Uuid) -> StoreResult<bool> {
        match self.users.get_mut(&user_id) {
            Some(mut user) => {
                user.refresh_token_hash = None;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn record_watch(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        capacity: usize,
    ) -> StoreResult<Vec<Uuid>> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;

        let mut history =
            WatchHistory::from_entries(std::mem::take(&mut user.watch_history), capacity);
        history.record(video_id);

        user.watch_history = history.into_vec();
        user.watch_history_version += 1;
        user.updated_at = Utc::now();
        Ok(user.watch_history.clone())
    }

    async fn watch_history(&self, user_id: Uuid) -> StoreResult<Option<Vec<Uuid>>> {
        Ok(self
            .users
            .get(&user_id)
            .map(|user| user.watch_history.clone()))
    }
}

#[async_trait]
impl VideoStore for InMemoryRecordStore {
    async fn increment_view_count(&self, video_id: Uuid) -> StoreResult<i64> {
        let mut views = self
            .videos
            .get_mut(&video_id)
            .ok_or_else(|| StoreError::NotFound(format!("video {}", video_id)))?;
        *views += 1;
        Ok(*views)
    }

    async fn view_count(&self, video_id: Uuid) -> StoreResult<Option<i64>> {
        Ok(self.videos.get(&video_id).map(|views| *views))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            full_name: name.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = InMemoryRecordStore::new();
        store.create_user(new_user("alice")).await.unwrap();

        let err = store.create_user(new_user("ALICE")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let store = InMemoryRecordStore::new();
        let alice = store.create_user(new_user("alice")).await.unwrap();

        let by_email = store
            .find_user_by_username_or_email(None, Some("Alice@Example.com"))
            .await
            .unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(alice.id));
    }

    #[tokio::test]
    async fn test_swap_requires_expected_value() {
        let store = InMemoryRecordStore::new();
        let user = store.create_user(new_user("bob")).await.unwrap();

        assert!(store.swap_refresh_token(user.id, None, Some("r0")).await.unwrap());
        assert!(!store.swap_refresh_token(user.id, Some("stale"), Some("r1")).await.unwrap());
        assert!(store.swap_refresh_token(user.id, Some("r0"), Some("r1")).await.unwrap());
        assert!(!store.swap_refresh_token(Uuid::new_v4(), None, Some("x")).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_record_watch_loses_nothing() {
        let store = Arc::new(InMemoryRecordStore::new());
        let user = store.create_user(new_user("carol")).await.unwrap();
        let videos: Vec<Uuid> = (0..20).map(|_| Uuid::new_v4()).collect();

        let handles: Vec<_> = videos
            .iter()
            .map(|video_id| {
                let store = store.clone();
                let video_id = *video_id;
                tokio::spawn(async move { store.record_watch(user.id, video_id, 100).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let history = store.watch_history(user.id).await.unwrap().unwrap();
        assert_eq!(history.len(), videos.len());
        assert!(videos.iter().all(|v| history.contains(v)));
    }

    #[tokio::test]
    async fn test_increment_unknown_video() {
        let store = InMemoryRecordStore::new();
        let err = store.increment_view_count(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
