//! Concurrent store of per-client windows.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::window::ClientWindow;

/// Result of recording one request against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    /// The client's window after this request was counted
    pub window: ClientWindow,
    /// Whether the request fits within the limit
    pub within_limit: bool,
}

/// Mapping from client key to its current window.
///
/// The read-check-increment-write for a key runs while holding that key's
/// shard guard, so concurrent requests for one client are serialized.
#[derive(Debug, Default)]
pub struct RateLimitStore {
    windows: DashMap<String, ClientWindow>,
}

impl RateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request for `key` at `now_ms`.
    ///
    /// A missing or expired window is replaced by a fresh one with a count
    /// of 1 and the request always fits. Otherwise the count is incremented
    /// and compared against `max` after the increment.
    pub fn hit(&self, key: &str, now_ms: u64, window_ms: u64, max: u64) -> Tally {
        match self.windows.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                let window = ClientWindow::open(now_ms, window_ms);
                vacant.insert(window);
                debug!(key = %key, reset_time_ms = window.reset_time_ms, "Opened client window");
                Tally {
                    window,
                    within_limit: true,
                }
            }
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                if window.is_expired(now_ms) {
                    *window = ClientWindow::open(now_ms, window_ms);
                    trace!(key = %key, reset_time_ms = window.reset_time_ms, "Reset expired client window");
                    return Tally {
                        window: *window,
                        within_limit: true,
                    };
                }

                // Denied attempts still count.
                window.count = window.count.saturating_add(1);
                Tally {
                    window: *window,
                    within_limit: window.count <= max,
                }
            }
        }
    }

    /// Remove every window that has expired at `now_ms`.
    ///
    /// Expired keys are collected first and then removed one at a time,
    /// re-checking expiry under that key's guard, so no lock is held for
    /// the whole scan and a window reopened in between is kept.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let expired: Vec<String> = self
            .windows
            .iter()
            .filter(|entry| entry.value().is_expired(now_ms))
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .iter()
            .filter(|key| {
                self.windows
                    .remove_if(key.as_str(), |_, window| window.is_expired(now_ms))
                    .is_some()
            })
            .count()
    }

    /// Get a copy of the stored window for `key`, expired or not.
    pub fn get(&self, key: &str) -> Option<ClientWindow> {
        self.windows.get(key).map(|window| *window)
    }

    /// Number of stored windows, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Remove all windows.
    pub fn clear(&self) {
        self.windows.clear();
    }
}
