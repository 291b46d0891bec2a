pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod metrics;
pub mod models;
pub mod security;
pub mod services;
pub mod startup;
pub mod utils;

pub use config::Settings;
pub use error::{AppError, Result};

use services::{AuthService, EngagementCoordinator, TokenService};

/// Services shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub tokens: TokenService,
    pub engagement: EngagementCoordinator,
    pub cookie_secure: bool,
}
