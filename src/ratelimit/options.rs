//! Limiter options, fixed at construction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{GatekeeperError, Result};

/// Default length of a counting window (1 minute).
pub const DEFAULT_WINDOW_MS: u64 = 60_000;
/// Default number of requests allowed per client per window.
pub const DEFAULT_MAX: u64 = 100;
/// Default body message for denied requests.
pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later";
/// Default HTTP status for denied requests.
pub const DEFAULT_STATUS_CODE: u16 = 429;
/// Default period between expired-record sweeps (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 300_000;

/// Configuration for a single rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitOptions {
    /// Length of each counting window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Maximum requests per client per window
    #[serde(default = "default_max")]
    pub max: u64,

    /// Message returned to denied clients
    #[serde(default = "default_message")]
    pub message: String,

    /// HTTP status returned to denied clients
    #[serde(default = "default_status_code")]
    pub status_code: u16,

    /// Period between sweeps of expired records, independent of the window
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Attach a `Retry-After` header to denials
    #[serde(default)]
    pub retry_after: bool,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max: default_max(),
            message: default_message(),
            status_code: default_status_code(),
            sweep_interval_ms: default_sweep_interval_ms(),
            retry_after: false,
        }
    }
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_max() -> u64 {
    DEFAULT_MAX
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

fn default_status_code() -> u16 {
    DEFAULT_STATUS_CODE
}

fn default_sweep_interval_ms() -> u64 {
    DEFAULT_SWEEP_INTERVAL_MS
}

impl RateLimitOptions {
    /// Options with the given window and ceiling, defaults elsewhere.
    pub fn new(window_ms: u64, max: u64) -> Self {
        Self {
            window_ms,
            max,
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_sweep_interval_ms(mut self, sweep_interval_ms: u64) -> Self {
        self.sweep_interval_ms = sweep_interval_ms;
        self
    }

    pub fn with_retry_after(mut self, retry_after: bool) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Reject options the limiter cannot run with.
    ///
    /// `max == 0` is accepted: the first request of every window is still
    /// allowed, since the ceiling is only checked on later requests.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(GatekeeperError::InvalidOptions(
                "window_ms must be positive".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(GatekeeperError::InvalidOptions(
                "sweep_interval_ms must be positive".to_string(),
            ));
        }
        if !(100..=999).contains(&self.status_code) {
            return Err(GatekeeperError::InvalidOptions(format!(
                "status_code {} is not a valid HTTP status",
                self.status_code
            )));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
