pub mod detached;
pub mod timeout;

pub use detached::run_detached;
pub use timeout::with_deadline;
