//! Rate limiting logic and state management.

mod limiter;
mod options;
mod scope;
mod store;
mod sweeper;
mod window;

pub use limiter::{Decision, RateLimiter, Rejection, RejectionBody};
pub use options::{
    RateLimitOptions, DEFAULT_MAX, DEFAULT_MESSAGE, DEFAULT_STATUS_CODE,
    DEFAULT_SWEEP_INTERVAL_MS, DEFAULT_WINDOW_MS,
};
pub use scope::{LimiterSet, ScopedLimiter};
pub use store::{RateLimitStore, Tally};
pub use sweeper::Sweeper;
pub use window::{ClientWindow, Clock, ManualClock, SystemClock};
