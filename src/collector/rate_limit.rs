//! Fixed-interval pacing between page fetches

use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Enforces a minimum delay between consecutive fetches
///
/// The first call to [`RateLimiter::wait`] returns immediately. Every later call
/// returns no earlier than `min_interval` after the previous call returned.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    /// Create a limiter with the given minimum interval
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Configured minimum interval
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Suspend until the next fetch is allowed
    ///
    /// Cancel-safe: if the future is dropped before completing, no fetch slot is consumed.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let ready_at = last + self.min_interval;
            if Instant::now() < ready_at {
                trace!(
                    delay_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Rate limiter delaying next fetch"
                );
                sleep_until(ready_at).await;
            }
        }
        self.last = Some(Instant::now());
    }
}
