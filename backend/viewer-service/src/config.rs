//! Configuration for the viewer service
//!
//! Loads settings from environment variables, with a `.env` file honoured in
//! debug builds.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub engagement: EngagementSettings,
    pub server: ServerSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            engagement: EngagementSettings::from_env()?,
            server: ServerSettings::from_env()?,
        })
    }
}

fn parse_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", key))
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub acquire_timeout: u64,
    pub run_migrations: bool,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", "20")?,
            acquire_timeout: parse_or("DATABASE_ACQUIRE_TIMEOUT", "5")?,
            run_migrations: parse_or("RUN_MIGRATIONS", "true")?,
        })
    }
}

/// Redis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
    /// Seconds
    pub connection_timeout: u64,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            connection_timeout: parse_or("REDIS_CONNECTION_TIMEOUT", "5")?,
        })
    }
}

/// Token signing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    #[serde(skip_serializing)]
    pub access_secret: String,
    #[serde(skip_serializing)]
    pub refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub cookie_secure: bool,
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        let access_secret =
            env::var("ACCESS_TOKEN_SECRET").context("ACCESS_TOKEN_SECRET must be set")?;
        let refresh_secret =
            env::var("REFRESH_TOKEN_SECRET").context("REFRESH_TOKEN_SECRET must be set")?;
        if access_secret == refresh_secret {
            bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        let access_ttl_secs = parse_or("ACCESS_TOKEN_EXPIRY_SECS", "900")?;
        let refresh_ttl_secs = parse_or("REFRESH_TOKEN_EXPIRY_SECS", "864000")?;
        if access_ttl_secs <= 0 || refresh_ttl_secs <= 0 {
            bail!("Token expiry must be positive");
        }

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl_secs,
            refresh_ttl_secs,
            cookie_secure: parse_or("COOKIE_SECURE", "true")?,
        })
    }

    pub fn access_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_ttl_secs)
    }
}

/// View counting and watch history settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementSettings {
    pub view_dedup_window_secs: u64,
    pub watch_history_capacity: usize,
    pub store_timeout_ms: u64,
    pub cache_timeout_ms: u64,
}

impl EngagementSettings {
    fn from_env() -> Result<Self> {
        let settings = Self {
            view_dedup_window_secs: parse_or("VIEW_DEDUP_WINDOW_SECS", "86400")?,
            watch_history_capacity: parse_or("WATCH_HISTORY_CAPACITY", "100")?,
            store_timeout_ms: parse_or("STORE_TIMEOUT_MS", "2000")?,
            cache_timeout_ms: parse_or("CACHE_TIMEOUT_MS", "500")?,
        };
        if settings.view_dedup_window_secs == 0 {
            bail!("VIEW_DEDUP_WINDOW_SECS must be positive");
        }
        if settings.watch_history_capacity == 0 {
            bail!("WATCH_HISTORY_CAPACITY must be positive");
        }
        Ok(settings)
    }

    pub fn view_dedup_window(&self) -> Duration {
        Duration::from_secs(self.view_dedup_window_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("SERVER_PORT", "8080")?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
