/// Access/refresh token issuance, verification and rotation
///
/// Exactly one refresh token is valid per user: the one whose digest is on the
/// user record. Every write of that digest is a compare-and-set against the
/// value read just before, so two racing rotations of the same token cannot
/// both win.
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::UserStore;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::User;
use crate::security::{hash_token, AccessClaims, JwtKeys};
use crate::utils::{run_detached, with_deadline};

/// Attempts at a compare-and-set before giving up with `Conflict`.
const ROTATION_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenService {
    users: Arc<dyn UserStore>,
    keys: Arc<JwtKeys>,
    store_timeout: Duration,
}

impl TokenService {
    pub fn new(users: Arc<dyn UserStore>, keys: JwtKeys, store_timeout: Duration) -> Self {
        Self {
            users,
            keys: Arc::new(keys),
            store_timeout,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Mint a fresh pair for `user_id` and make its refresh token the current
    /// one, superseding whatever was stored before.
    pub async fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair> {
        let this = self.clone();
        run_detached("issue token pair", async move { this.rotate_for_issue(user_id).await })
            .await
    }

    /// Validate signature and expiry, then confirm the subject still exists.
    pub async fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        if token.trim().is_empty() {
            return Err(AppError::Unauthorized("Unauthorized request".into()));
        }

        let claims = self.keys.decode_access(token)?;
        let user_id = claims.user_id()?;

        if self.load_user(user_id).await?.is_none() {
            debug!(user_id = %user_id, "access token for deleted user");
            return Err(AppError::Unauthorized("Invalid access token".into()));
        }

        Ok(claims)
    }

    /// Exchange the current refresh token for a new pair.
    ///
    /// The presented token must equal the stored one. A token that was
    /// already exchanged, or lost a race against a concurrent exchange,
    /// fails with `Unauthorized`.
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair> {
        if presented.trim().is_empty() {
            metrics::record_refresh_rejected("invalid");
            return Err(AppError::Unauthorized("Unauthorized request".into()));
        }

        let this = self.clone();
        let presented = presented.to_string();
        run_detached("rotate refresh token", async move {
            this.rotate_for_refresh(&presented).await
        })
        .await
    }

    /// Clear the stored refresh token; every previously issued refresh token
    /// for the user stops working.
    pub async fn invalidate(&self, user_id: Uuid) -> Result<()> {
        let users = self.users.clone();
        let store_timeout = self.store_timeout;

        run_detached("clear refresh token", async move {
            let cleared = with_deadline(
                store_timeout,
                "clear refresh token",
                users.clear_refresh_token(user_id),
            )
            .await?;

            if !cleared {
                return Err(AppError::NotFound(format!("user {}", user_id)));
            }
            info!(user_id = %user_id, "Refresh token invalidated");
            Ok(())
        })
        .await
    }

    async fn rotate_for_issue(&self, user_id: Uuid) -> Result<TokenPair> {
        for attempt in 1..=ROTATION_ATTEMPTS {
            let user = self
                .load_user(user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;

            let pair = self.mint(&user)?;
            let new_hash = hash_token(&pair.refresh_token);

            if self
                .swap(user.id, user.refresh_token_hash.as_deref(), &new_hash)
                .await?
            {
                metrics::record_token_issued("issue");
                return Ok(pair);
            }
            debug!(user_id = %user_id, attempt, "refresh token moved while issuing");
        }

        Err(AppError::Conflict(format!(
            "refresh token of user {} changed concurrently",
            user_id
        )))
    }

    async fn rotate_for_refresh(&self, presented: &str) -> Result<TokenPair> {
        let claims = self.keys.decode_refresh(presented).map_err(|e| {
            metrics::record_refresh_rejected("invalid");
            e
        })?;
        let user_id = claims.user_id()?;
        let presented_hash = hash_token(presented);

        for attempt in 1..=ROTATION_ATTEMPTS {
            let Some(user) = self.load_user(user_id).await? else {
                metrics::record_refresh_rejected("unknown_user");
                return Err(AppError::Unauthorized("Invalid refresh token".into()));
            };

            if user.refresh_token_hash.as_deref() != Some(presented_hash.as_str()) {
                warn!(user_id = %user_id, "Refresh token is superseded or cleared");
                metrics::record_refresh_rejected("stale");
                return Err(AppError::Unauthorized(
                    "Refresh token is expired or used".into(),
                ));
            }

            let pair = self.mint(&user)?;
            let new_hash = hash_token(&pair.refresh_token);

            if self.swap(user.id, Some(&presented_hash), &new_hash).await? {
                metrics::record_token_issued("refresh");
                debug!(user_id = %user_id, "Refresh token rotated");
                return Ok(pair);
            }
            // Re-read: a concurrent exchange that won shows up as a stale token
            debug!(user_id = %user_id, attempt, "refresh token swap lost");
        }

        metrics::record_refresh_rejected("conflict");
        Err(AppError::Conflict(format!(
            "refresh token of user {} changed concurrently",
            user_id
        )))
    }

    fn mint(&self, user: &User) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.keys.generate_access_token(user)?,
            refresh_token: self.keys.generate_refresh_token(user.id)?,
        })
    }

    async fn load_user(&self, user_id: Uuid) -> Result<Option<User>> {
        with_deadline(
            self.store_timeout,
            "find user",
            self.users.find_user_by_id(user_id),
        )
        .await
    }

    async fn swap(&self, user_id: Uuid, expected: Option<&str>, new: &str) -> Result<bool> {
        with_deadline(
            self.store_timeout,
            "swap refresh token",
            self.users.swap_refresh_token(user_id, expected, Some(new)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::ScriptedUserStore;
    use crate::db::InMemoryRecordStore;
    use crate::models::NewUser;
    use std::sync::atomic::Ordering;

    fn keys() -> JwtKeys {
        JwtKeys::new(
            "test-access-secret",
            "test-refresh-secret",
            chrono::Duration::minutes(15),
            chrono::Duration::days(10),
        )
        .unwrap()
    }

    fn alice() -> NewUser {
        NewUser {
            username: "alice".into(),
            email: "alice@example.com".into(),
            full_name: "Alice".into(),
            password_hash: "hash".into(),
        }
    }

    async fn service_with_alice() -> (TokenService, Arc<InMemoryRecordStore>, Uuid) {
        let store = Arc::new(InMemoryRecordStore::new());
        let alice = store.create_user(alice()).await.unwrap();
        let service = TokenService::new(store.clone(), keys(), Duration::from_secs(1));
        (service, store, alice.id)
    }

    async fn scripted_with_alice() -> (TokenService, Arc<ScriptedUserStore>, Uuid) {
        let store = Arc::new(ScriptedUserStore::new());
        let alice = store.create_user(alice()).await.unwrap();
        let service = TokenService::new(store.clone(), keys(), Duration::from_millis(100));
        (service, store, alice.id)
    }

    #[tokio::test]
    async fn test_issue_pair_stores_digest_of_refresh_token() {
        let (service, store, alice) = service_with_alice().await;

        let pair = service.issue_pair(alice).await.unwrap();

        let stored = store.find_user_by_id(alice).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token_hash, Some(hash_token(&pair.refresh_token)));
        assert_ne!(stored.refresh_token_hash.as_deref(), Some(pair.refresh_token.as_str()));
    }

    #[tokio::test]
    async fn test_issue_pair_unknown_user() {
        let (service, _, _) = service_with_alice().await;
        let err = service.issue_pair(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_rejects_reuse() {
        let (service, _, alice) = service_with_alice().await;
        let first = service.issue_pair(alice).await.unwrap();

        let second = service.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        let reuse = service.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(reuse, AppError::Unauthorized(_)));

        assert!(service.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_new_login_supersedes_previous_refresh_token() {
        let (service, _, alice) = service_with_alice().await;
        let old = service.issue_pair(alice).await.unwrap();
        let _new = service.issue_pair(alice).await.unwrap();

        let err = service.refresh(&old.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_invalidate_kills_refresh_token() {
        let (service, _, alice) = service_with_alice().await;
        let pair = service.issue_pair(alice).await.unwrap();

        service.invalidate(alice).await.unwrap();

        let err = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_invalidate_unknown_user() {
        let (service, _, _) = service_with_alice().await;
        let err = service.invalidate(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_access_token_not_usable_as_refresh_token() {
        let (service, _, alice) = service_with_alice().await;
        let pair = service.issue_pair(alice).await.unwrap();

        let err = service.refresh(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(matches!(
            service.refresh("").await.unwrap_err(),
            AppError::Unauthorized(_)
        ));
    }

    #[tokio::test]
    async fn test_verify_access_requires_existing_user() {
        let (service, store, alice) = service_with_alice().await;
        let pair = service.issue_pair(alice).await.unwrap();

        let claims = service.verify_access(&pair.access_token).await.unwrap();
        assert_eq!(claims.user_id().unwrap(), alice);
        assert_eq!(claims.username, "alice");

        store.remove_user(alice);
        let err = service.verify_access(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_verify_access_rejects_refresh_token() {
        let (service, _, alice) = service_with_alice().await;
        let pair = service.issue_pair(alice).await.unwrap();

        let err = service.verify_access(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_single_winner() {
        let (service, _, alice) = service_with_alice().await;
        let pair = service.issue_pair(alice).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let token = pair.refresh_token.clone();
                tokio::spawn(async move { service.refresh(&token).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(AppError::Unauthorized(_)) | Err(AppError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_refresh_loser_of_swap_sees_changed_value() {
        let (service, store, alice) = scripted_with_alice().await;
        let pair = service.issue_pair(alice).await.unwrap();

        store.rival_wins_with("winner-digest");
        store.lose_swaps(1);

        let err = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let stored = store.find_user_by_id(alice).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token_hash.as_deref(), Some("winner-digest"));
    }

    #[tokio::test]
    async fn test_issue_pair_retries_once_then_conflicts() {
        let (service, store, alice) = scripted_with_alice().await;

        store.lose_swaps(1);
        assert!(service.issue_pair(alice).await.is_ok());
        assert_eq!(store.swap_calls.load(Ordering::SeqCst), 2);

        store.lose_swaps(2);
        let err = service.issue_pair(alice).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.swap_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_store_failure_is_unavailable() {
        let (service, store, alice) = scripted_with_alice().await;
        store.fail_reads();

        let err = service.issue_pair(alice).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let (service, store, alice) = scripted_with_alice().await;
        store.delay_reads(Duration::from_secs(5));

        let err = service.issue_pair(alice).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout { operation: "find user", .. }));
    }
}
