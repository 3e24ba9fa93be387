//! Collector configuration constants and tunables

use std::time::Duration;

use super::CollectError;

/// Default minimum delay between consecutive page fetches.
/// One second matches the pace a human scrolling a search page would produce,
/// which keeps UI-driven sources from throttling or blocking the session.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Default upper bound on a single page fetch.
/// Ten seconds is the longest a "load more" interaction is expected to take;
/// anything slower is treated as the end of the window rather than a hang.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Default page budget per sub-window.
/// 10,000 pages is far beyond any realistic day of results, so it only trips
/// when a source keeps returning a next cursor without making progress.
pub const DEFAULT_MAX_PAGES_PER_WINDOW: u32 = 10_000;

/// Default number of retries for a failed HTTP page request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound accepted for `max_retries`.
/// With the backoff cap below, 10 retries already means several minutes on one page.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Wait before the first HTTP retry, doubled on each further attempt.
pub const FIRST_RETRY_DELAY_MS: u64 = 1_000;

/// Ceiling for the doubled retry wait.
pub const RETRY_DELAY_CAP_MS: u64 = 30_000;

/// Default root directory for run directories
pub const DEFAULT_DATA_DIR: &str = ".harvest";

/// Record store file name inside a run directory
pub const STORE_FILE_NAME: &str = "records.jsonl";

/// Checkpoint file name inside a run directory
pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.json";

/// Lock file name inside a run directory
pub const LOCK_FILE_NAME: &str = "run.lock";

/// Wait before retry number `attempt` (zero-based) of a failed page request
pub fn retry_delay(attempt: u32) -> Duration {
    let doubled = FIRST_RETRY_DELAY_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(doubled.min(RETRY_DELAY_CAP_MS))
}

/// Tunables for one collection run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Minimum delay between consecutive page fetches
    pub rate_limit: Duration,
    /// Upper bound on one request attempt
    pub fetch_timeout: Duration,
    /// Page budget per sub-window
    pub max_pages_per_window: u32,
    /// Retries for transient HTTP failures inside one fetch
    pub max_retries: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            rate_limit: Duration::from_millis(DEFAULT_RATE_LIMIT_MS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_pages_per_window: DEFAULT_MAX_PAGES_PER_WINDOW,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl CollectorConfig {
    /// Set the minimum delay between fetches
    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Set the per-attempt timeout
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Set the page budget per sub-window
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages_per_window = max_pages;
        self
    }

    /// Set the HTTP retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Upper bound on one whole fetch, every retry and retry wait included
    ///
    /// `fetch_timeout * (max_retries + 1)` plus the [`retry_delay`] before each retry.
    /// An elapsed budget ends the window as a timeout.
    pub fn fetch_budget(&self) -> Duration {
        let attempts = self.fetch_timeout.saturating_mul(self.max_retries.saturating_add(1));
        (0..self.max_retries)
            .map(retry_delay)
            .fold(attempts, Duration::saturating_add)
    }

    /// Validate tunables
    ///
    /// A zero rate limit is allowed (no pacing); timeouts and page budgets must be positive.
    pub fn validate(&self) -> Result<(), CollectError> {
        if self.fetch_timeout.is_zero() {
            return Err(CollectError::Config(
                "fetch timeout must be greater than zero".to_string(),
            ));
        }

        if self.max_pages_per_window == 0 {
            return Err(CollectError::Config(
                "max pages per window must be at least 1".to_string(),
            ));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(CollectError::Config(format!(
                "max retries must be between 0 and {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }

        Ok(())
    }
}
