//! Background Expiry
//!
//! Lazy expiry (checking on access) never reclaims a key nobody reads
//! again. This module adds the two timer-driven paths:
//!
//! - [`ExpirySweeper`]: a Tokio task that calls [`Store::sweep_expired`]
//!   on a fixed interval until stopped.
//! - [`schedule_deletion`]: a one-shot task that deletes a single key after
//!   a delay, used by `DELETEEX`.
//!
//! Both listen on a `watch` channel so shutdown interrupts the wait
//! instead of leaving tasks parked on a timer.

use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval between sweeps (default: 1s)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```
    /// use linekv::storage::{ExpiryConfig, ExpirySweeper, Store};
    /// use std::sync::Arc;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let store = Arc::new(Store::new());
    /// let sweeper = ExpirySweeper::start(store, ExpiryConfig::default());
    ///
    /// // Dropping the handle stops the task
    /// drop(sweeper);
    /// # }
    /// ```
    pub fn start(store: Arc<Store>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(store, config, shutdown_rx));

        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    store: Arc<Store>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let expired = store.sweep_expired();
        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = store.len(),
                "Expired keys cleaned up"
            );
        } else {
            trace!("Expiry sweep found nothing");
        }
    }
}

/// Deletes `key` once `delay` has elapsed.
///
/// The deletion is unconditional: if the key was overwritten in the
/// meantime, the new value is deleted too. When `shutdown` flips to `true`
/// first, the task exits without touching the store. A dropped shutdown
/// sender never cancels the deletion.
pub fn schedule_deletion(
    store: Arc<Store>,
    key: String,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if *shutdown.borrow() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let existed = store.delete(&key);
                debug!(key = %key, existed = existed, "Deferred deletion fired");
            }
            Ok(_) = shutdown.wait_for(|stopped| *stopped) => {
                trace!(key = %key, "Deferred deletion cancelled by shutdown");
            }
        }
    })
}
