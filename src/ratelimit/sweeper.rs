//! Background sweep of expired client windows.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::store::RateLimitStore;
use super::window::Clock;
use crate::error::{GatekeeperError, Result};

/// A cancellable task that periodically removes expired windows.
///
/// The task stops when [`Sweeper::stop`] is called or the handle is dropped.
pub struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn the sweep task on the current tokio runtime.
    ///
    /// The first sweep runs one `interval` after spawning. Fails when called
    /// outside a runtime.
    pub fn spawn(
        name: String,
        store: Arc<RateLimitStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            GatekeeperError::Runtime(format!("cannot start sweeper for {}: {}", name, e))
        })?;
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            debug!(limiter = %name, interval_ms = interval.as_millis() as u64, "Sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep(clock.now_ms());
                        if removed > 0 {
                            info!(
                                limiter = %name,
                                removed = removed,
                                remaining = store.len(),
                                "Swept expired client windows"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!(limiter = %name, "Sweeper stopped");
        });

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Whether the sweep task is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweeper task ended abnormally");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
