pub mod auth;
pub mod engagement;
pub mod token_service;
pub mod view_dedup;
pub mod watch_history;

pub use auth::{AuthService, LoginOutcome, Registration};
pub use engagement::{EngagementCoordinator, ViewReport};
pub use token_service::{TokenPair, TokenService};
pub use view_dedup::{ViewDedupCache, DEFAULT_VIEW_DEDUP_WINDOW};
pub use watch_history::WatchHistoryLedger;
