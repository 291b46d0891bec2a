use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::UserStore;
use crate::error::{AppError, Result};
use crate::models::{NewUser, User, UserProfile};
use crate::security::password::validate_password;
use crate::security::PasswordVerifier;
use crate::services::{TokenPair, TokenService};
use crate::utils::with_deadline;

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub user: UserProfile,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Account flows layered on the token service: registration, login, logout
/// and password change.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: TokenService,
    passwords: Arc<dyn PasswordVerifier>,
    store_timeout: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenService,
        passwords: Arc<dyn PasswordVerifier>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            passwords,
            store_timeout,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn register(&self, registration: Registration) -> Result<UserProfile> {
        let Registration {
            username,
            email,
            full_name,
            password,
        } = registration;

        let username = username.trim().to_lowercase();
        let email = email.trim().to_lowercase();
        let full_name = full_name.trim().to_string();

        if username.is_empty() || email.is_empty() || full_name.is_empty() {
            return Err(AppError::Validation("All fields are required".into()));
        }
        if !email.contains('@') {
            return Err(AppError::Validation("Email address is invalid".into()));
        }
        validate_password(&password)?;

        let existing = with_deadline(
            self.store_timeout,
            "find user",
            self.users
                .find_user_by_username_or_email(Some(username.as_str()), Some(email.as_str())),
        )
        .await?;
        if existing.is_some() {
            return Err(AppError::AlreadyExists(
                "User with email or username already exists".into(),
            ));
        }

        let password_hash = self.hash_password(password).await?;
        let user = with_deadline(
            self.store_timeout,
            "create user",
            self.users.create_user(NewUser {
                username,
                email,
                full_name,
                password_hash,
            }),
        )
        .await?;

        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(user.profile())
    }

    /// Authenticate by username or email and start a session.
    pub async fn login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        password: &str,
    ) -> Result<LoginOutcome> {
        let username = non_blank(username).map(str::to_lowercase);
        let email = non_blank(email).map(str::to_lowercase);
        if username.is_none() && email.is_none() {
            return Err(AppError::Validation("username or email is required".into()));
        }

        let user = with_deadline(
            self.store_timeout,
            "find user",
            self.users
                .find_user_by_username_or_email(username.as_deref(), email.as_deref()),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User does not exist".into()))?;

        if !self.check_password(password, &user).await? {
            warn!(user_id = %user.id, "Login with invalid credentials");
            return Err(AppError::Unauthorized("Invalid user credentials".into()));
        }

        let tokens = self.tokens.issue_pair(user.id).await?;
        info!(user_id = %user.id, "User logged in");

        Ok(LoginOutcome {
            user: user.profile(),
            tokens,
        })
    }

    pub async fn logout(&self, user_id: Uuid) -> Result<()> {
        self.tokens.invalidate(user_id).await?;
        info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Replace the password after checking the old one. Outstanding refresh
    /// tokens are cleared with it.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let user = self.load_user(user_id).await?;

        if !self.check_password(old_password, &user).await? {
            return Err(AppError::Unauthorized("Invalid old password".into()));
        }
        validate_password(new_password)?;

        let password_hash = self.hash_password(new_password.to_string()).await?;
        with_deadline(
            self.store_timeout,
            "update password",
            self.users.update_password_hash(user_id, &password_hash),
        )
        .await?;
        self.tokens.invalidate(user_id).await?;

        info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<UserProfile> {
        Ok(self.load_user(user_id).await?.profile())
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User> {
        with_deadline(
            self.store_timeout,
            "find user",
            self.users.find_user_by_id(user_id),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    // Argon2 is CPU bound; keep it off the async workers
    async fn hash_password(&self, password: String) -> Result<String> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || passwords.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    async fn check_password(&self, password: &str, user: &User) -> Result<bool> {
        let passwords = self.passwords.clone();
        let password = password.to_string();
        let hash = user.password_hash.clone();
        tokio::task::spawn_blocking(move || passwords.verify(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password check task failed: {}", e)))?
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
