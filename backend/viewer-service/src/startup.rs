/// Process wiring: logging, connections and service graph
///
/// Connections are opened explicitly by `connect` and closed by `shutdown`;
/// nothing here is a process-wide singleton.
use anyhow::{Context, Result};
use redis_utils::RedisPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::{RedisWindowedCache, WindowedCache};
use crate::config::Settings;
use crate::db::{PgRecordStore, UserStore, VideoStore};
use crate::security::{Argon2PasswordVerifier, JwtKeys, PasswordVerifier};
use crate::services::{
    AuthService, EngagementCoordinator, TokenService, ViewDedupCache, WatchHistoryLedger,
};
use crate::AppState;

pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "viewer_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();
}

/// Live external connections owned by the process
pub struct Resources {
    pub db: PgPool,
    pub redis: RedisPool,
}

pub async fn connect(settings: &Settings) -> Result<Resources> {
    let db = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout))
        .connect(&settings.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    info!(
        "Database pool initialized with {} max connections",
        settings.database.max_connections
    );

    if settings.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed");
    }

    let redis = RedisPool::connect(
        &settings.redis.url,
        Duration::from_secs(settings.redis.connection_timeout),
    )
    .await
    .context("Failed to connect to Redis")?;

    Ok(Resources { db, redis })
}

/// Collaborators the service graph is built from
pub struct Collaborators {
    pub users: Arc<dyn UserStore>,
    pub videos: Arc<dyn VideoStore>,
    pub cache: Arc<dyn WindowedCache>,
    pub passwords: Arc<dyn PasswordVerifier>,
}

impl Collaborators {
    pub fn from_resources(resources: &Resources, settings: &Settings) -> Self {
        let store = Arc::new(PgRecordStore::new(resources.db.clone()));
        Self {
            users: store.clone(),
            videos: store,
            cache: Arc::new(RedisWindowedCache::new(
                resources.redis.manager(),
                settings.engagement.cache_timeout(),
            )),
            passwords: Arc::new(Argon2PasswordVerifier),
        }
    }
}

pub fn build_state(settings: &Settings, collaborators: Collaborators) -> Result<AppState> {
    let Collaborators {
        users,
        videos,
        cache,
        passwords,
    } = collaborators;
    let engagement = &settings.engagement;

    let keys = JwtKeys::new(
        &settings.jwt.access_secret,
        &settings.jwt.refresh_secret,
        settings.jwt.access_ttl(),
        settings.jwt.refresh_ttl(),
    )
    .context("Failed to initialize JWT keys")?;

    let tokens = TokenService::new(users.clone(), keys, engagement.store_timeout());
    let auth = AuthService::new(
        users.clone(),
        tokens.clone(),
        passwords,
        engagement.store_timeout(),
    );
    let coordinator = EngagementCoordinator::new(
        ViewDedupCache::new(
            cache,
            engagement.view_dedup_window(),
            engagement.cache_timeout(),
        ),
        WatchHistoryLedger::new(
            users,
            engagement.watch_history_capacity,
            engagement.store_timeout(),
        ),
        videos,
        engagement.store_timeout(),
    );

    Ok(AppState {
        auth,
        tokens,
        engagement: coordinator,
        cookie_secure: settings.jwt.cookie_secure,
    })
}

pub async fn shutdown(resources: Resources) {
    resources.redis.shutdown();
    resources.db.close().await;
    info!("Connections closed");
}
