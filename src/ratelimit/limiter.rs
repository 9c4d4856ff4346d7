//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, trace};

use super::options::RateLimitOptions;
use super::store::RateLimitStore;
use super::sweeper::Sweeper;
use super::window::{ClientWindow, Clock, SystemClock};
use crate::error::Result;

/// Name used for limiters that were not given one.
const DEFAULT_NAME: &str = "default";

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed
    Allow,
    /// The request exceeded the limit and must be rejected
    Deny(Rejection),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// What the HTTP layer needs to reject a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// HTTP status for the response
    pub status_code: u16,
    /// Message placed in the response body
    pub message: String,
    /// Time until the client's window resets, when retry hints are enabled
    pub retry_after: Option<Duration>,
}

/// JSON body sent with a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionBody {
    pub success: bool,
    pub message: String,
}

impl Rejection {
    pub fn body(&self) -> RejectionBody {
        RejectionBody {
            success: false,
            message: self.message.clone(),
        }
    }
}

/// A fixed-window rate limiter keyed by client identity.
///
/// Each limiter owns its store and sweep task, so several limiters with
/// different options can run side by side without sharing counters.
pub struct RateLimiter {
    name: String,
    options: RateLimitOptions,
    store: Arc<RateLimitStore>,
    clock: Arc<dyn Clock>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("clients", &self.store.len())
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter using the system clock.
    pub fn new(options: RateLimitOptions) -> Result<Self> {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(options: RateLimitOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            name: DEFAULT_NAME.to_string(),
            options,
            store: Arc::new(RateLimitStore::new()),
            clock,
            sweeper: Mutex::new(None),
        })
    }

    /// Give the limiter a name for logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Decide whether a request from `client_key` at `now_ms` may proceed.
    pub fn admit(&self, client_key: &str, now_ms: u64) -> Decision {
        let tally = self
            .store
            .hit(client_key, now_ms, self.options.window_ms, self.options.max);

        trace!(
            limiter = %self.name,
            key = %client_key,
            count = tally.window.count,
            reset_time_ms = tally.window.reset_time_ms,
            "Checked rate limit"
        );

        if tally.within_limit {
            return Decision::Allow;
        }

        debug!(
            limiter = %self.name,
            key = %client_key,
            count = tally.window.count,
            max = self.options.max,
            "Rate limit exceeded"
        );

        let retry_after = self
            .options
            .retry_after
            .then(|| Duration::from_millis(tally.window.remaining_ms(now_ms)));

        Decision::Deny(Rejection {
            status_code: self.options.status_code,
            message: self.options.message.clone(),
            retry_after,
        })
    }

    /// [`admit`](Self::admit) at the limiter clock's current time.
    pub fn check(&self, client_key: &str) -> Decision {
        self.admit(client_key, self.clock.now_ms())
    }

    /// Remove records whose window has ended at `now_ms`.
    pub fn sweep(&self, now_ms: u64) -> usize {
        self.store.sweep(now_ms)
    }

    /// Start the periodic sweep on the current tokio runtime.
    ///
    /// Returns `false` if it was already running, and an error when called
    /// outside a runtime.
    pub fn start(&self) -> Result<bool> {
        let mut sweeper = self.sweeper.lock();
        if sweeper.as_ref().is_some_and(Sweeper::is_running) {
            return Ok(false);
        }

        *sweeper = Some(Sweeper::spawn(
            self.name.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.options.sweep_interval(),
        )?);

        info!(
            limiter = %self.name,
            window_ms = self.options.window_ms,
            max = self.options.max,
            sweep_interval_ms = self.options.sweep_interval_ms,
            "Started rate limiter"
        );
        Ok(true)
    }

    /// Stop the periodic sweep and wait for it to finish.
    pub async fn stop(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
            info!(limiter = %self.name, "Stopped rate limiter");
        }
    }

    /// Whether the periodic sweep is running.
    pub fn is_running(&self) -> bool {
        self.sweeper.lock().as_ref().is_some_and(Sweeper::is_running)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &RateLimitOptions {
        &self.options
    }

    /// Get the stored window for a client, if any.
    pub fn window(&self, client_key: &str) -> Option<ClientWindow> {
        self.store.get(client_key)
    }

    /// Get the number of stored client windows.
    pub fn client_count(&self) -> usize {
        self.store.len()
    }

    /// Clear all client windows.
    pub fn clear(&self) {
        self.store.clear();
    }
}
