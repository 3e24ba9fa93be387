//! Cooperative stop signal for a collection run.
//!
//! `main` wires Ctrl+C to a [`ShutdownCoordinator`] and hands it to the
//! controller. The active session polls it between records and races it against
//! rate-limiter waits, so a stop request lands on a record boundary and never
//! inside a checkpoint write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Stop signal shared between the signal task and the collector.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// One-shot stop flag with async wakeup.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    requested: AtomicBool,
    wake: Notify,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for the common `Arc` case.
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::default())
    }

    /// Raise the flag. Only the first call wakes sleepers.
    pub fn request_shutdown(&self) {
        let already = self.requested.swap(true, Ordering::SeqCst);
        if !already {
            self.wake.notify_waiters();
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once a stop has been requested, immediately if it already was.
    pub async fn wait_for_shutdown(&self) {
        let woken = self.wake.notified();
        tokio::pin!(woken);
        // Register before checking the flag so a concurrent request cannot be missed
        woken.as_mut().enable();

        if self.requested.load(Ordering::SeqCst) {
            return;
        }
        woken.await;
    }
}
