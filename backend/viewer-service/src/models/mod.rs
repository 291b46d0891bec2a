pub mod user;
pub mod watch_history;

pub use user::{NewUser, User, UserProfile};
pub use watch_history::{WatchHistory, DEFAULT_WATCH_HISTORY_CAPACITY};
