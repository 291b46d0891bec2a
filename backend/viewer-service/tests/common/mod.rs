#![allow(dead_code)]

use std::sync::Arc;

use viewer_service::cache::InMemoryWindowedCache;
use viewer_service::config::{
    DatabaseSettings, EngagementSettings, JwtSettings, RedisSettings, ServerSettings, Settings,
};
use viewer_service::db::{InMemoryRecordStore, UserStore};
use viewer_service::models::NewUser;
use viewer_service::security::{hash_password, Argon2PasswordVerifier};
use viewer_service::startup::{build_state, Collaborators};
use viewer_service::AppState;

pub const PASSWORD: &str = "correct-horse-battery";

pub fn test_settings() -> Settings {
    Settings {
        database: DatabaseSettings {
            url: "postgres://unused".into(),
            max_connections: 1,
            acquire_timeout: 1,
            run_migrations: false,
        },
        redis: RedisSettings {
            url: "redis://unused".into(),
            connection_timeout: 1,
        },
        jwt: JwtSettings {
            access_secret: "integration-access-secret".into(),
            refresh_secret: "integration-refresh-secret".into(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 864_000,
            cookie_secure: false,
        },
        engagement: EngagementSettings {
            view_dedup_window_secs: 86_400,
            watch_history_capacity: 100,
            store_timeout_ms: 2_000,
            cache_timeout_ms: 500,
        },
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryRecordStore>,
    pub cache: Arc<InMemoryWindowedCache>,
}

pub fn test_app() -> TestApp {
    let store = Arc::new(InMemoryRecordStore::new());
    let cache = Arc::new(InMemoryWindowedCache::new());
    let state = build_state(
        &test_settings(),
        Collaborators {
            users: store.clone(),
            videos: store.clone(),
            cache: cache.clone(),
            passwords: Arc::new(Argon2PasswordVerifier),
        },
    )
    .expect("state");

    TestApp {
        state,
        store,
        cache,
    }
}

pub async fn seed_user(store: &InMemoryRecordStore, username: &str) -> uuid::Uuid {
    store
        .create_user(NewUser {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            full_name: format!("{} tester", username),
            password_hash: hash_password(PASSWORD).expect("hash"),
        })
        .await
        .expect("seed user")
        .id
}
