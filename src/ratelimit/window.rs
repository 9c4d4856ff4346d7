//! Per-client counting windows and the clocks that drive them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counting record for a single client within one fixed window.
///
/// `count` is at least 1 whenever the record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientWindow {
    /// Requests observed in the current window, including denied ones
    pub count: u64,
    /// Epoch milliseconds at which this window ends
    pub reset_time_ms: u64,
}

impl ClientWindow {
    /// Open a new window starting at `now_ms`.
    pub fn open(now_ms: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            reset_time_ms: now_ms.saturating_add(window_ms),
        }
    }

    /// Whether the window has ended at `now_ms`.
    ///
    /// An expired record is logically absent even if still stored.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.reset_time_ms
    }

    /// Milliseconds left until the window resets.
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.reset_time_ms.saturating_sub(now_ms)
    }
}

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by chrono.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        // Pre-epoch clocks clamp to zero.
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Manually advanced clock, mainly for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by_ms: u64) {
        self.now_ms.fetch_add(by_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
