//! Fetch loop for a single sub-window
//!
//! A session pages through one [`SubWindow`] until one of:
//!
//! - the window's quota is exceeded (the page that crosses the quota is the last page),
//! - the fetcher reports the end of results, an empty page, a timeout or a transient failure,
//! - the per-window page budget is spent,
//! - an operator interrupt is observed.
//!
//! Every record is appended to the store as soon as its page arrives; the store is
//! synced at each page boundary. Fetcher failures marked fatal abort the run.

use indicatif::ProgressBar;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::config::CollectorConfig;
use super::rate_limit::RateLimiter;
use super::schedule::SubWindow;
use super::CollectError;
use crate::fetcher::{Cursor, EndReason, FetchRequest, PageFetcher, PageOutcome};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::store::RecordStore;
use crate::Query;

/// Why a session stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The window's quota was exceeded (or was zero)
    QuotaReached,
    /// The source ended the window
    End(EndReason),
    /// An operator interrupt was observed
    Interrupted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaReached => f.write_str("quota reached"),
            Self::End(reason) => write!(f, "ended: {reason}"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

impl Serialize for Termination {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// The window collected
    pub window: SubWindow,
    /// Records newly written to the store
    pub collected: u64,
    /// Fetched records whose url was already stored
    pub duplicates: u64,
    /// Pages received
    pub pages: u32,
    /// Why the session stopped
    pub termination: Termination,
}

impl SessionReport {
    fn new(window: SubWindow) -> Self {
        Self {
            window,
            collected: 0,
            duplicates: 0,
            pages: 0,
            termination: Termination::QuotaReached,
        }
    }

    /// Records this window has accounted for: newly stored plus already stored
    ///
    /// Already-stored records count toward the window quota, so re-fetching a window
    /// that was interrupted midway stops at the same point an uninterrupted pass would.
    pub fn seen(&self) -> u64 {
        self.collected + self.duplicates
    }

    /// How far the window fell short of its quota
    pub fn shortfall(&self) -> u64 {
        self.window.quota.saturating_sub(self.seen())
    }
}

/// Collects up to one window's quota of records
pub struct CollectionSession<'a, F: PageFetcher + ?Sized> {
    request: FetchRequest,
    window: SubWindow,
    fetcher: &'a mut F,
    store: &'a mut RecordStore,
    limiter: &'a mut RateLimiter,
    config: &'a CollectorConfig,
    shutdown: Option<&'a ShutdownCoordinator>,
    progress_bar: Option<&'a ProgressBar>,
}

impl<'a, F: PageFetcher + ?Sized> CollectionSession<'a, F> {
    /// Create a session for `window` of `query`
    pub fn new(
        query: &Query,
        window: SubWindow,
        fetcher: &'a mut F,
        store: &'a mut RecordStore,
        limiter: &'a mut RateLimiter,
        config: &'a CollectorConfig,
    ) -> Self {
        Self {
            request: FetchRequest::for_window(query, &window),
            window,
            fetcher,
            store,
            limiter,
            config,
            shutdown: None,
            progress_bar: None,
        }
    }

    /// Observe an operator interrupt
    pub fn with_shutdown(mut self, shutdown: Option<&'a ShutdownCoordinator>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Advance a progress bar for every stored record
    pub fn with_progress_bar(mut self, progress_bar: Option<&'a ProgressBar>) -> Self {
        self.progress_bar = progress_bar;
        self
    }

    /// Run the fetch loop to completion
    pub async fn run(self) -> Result<SessionReport, CollectError> {
        let span = info_span!(
            "window",
            index = self.window.index,
            since = %self.window.since,
            quota = self.window.quota
        );
        self.collect().instrument(span).await
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    async fn collect(mut self) -> Result<SessionReport, CollectError> {
        let mut report = SessionReport::new(self.window);

        if self.window.quota == 0 {
            debug!("Window has no quota; skipping fetch");
            return Ok(report);
        }

        let mut cursor = Cursor::start();
        report.termination = loop {
            if self.shutdown_requested() {
                break Termination::Interrupted;
            }
            if report.pages >= self.config.max_pages_per_window {
                break Termination::End(EndReason::PageLimit);
            }

            if let Some(shutdown) = self.shutdown {
                tokio::select! {
                    _ = self.limiter.wait() => {},
                    _ = shutdown.wait_for_shutdown() => break Termination::Interrupted,
                }
            } else {
                self.limiter.wait().await;
            }

            let started = Instant::now();
            let outcome = match tokio::time::timeout(
                self.config.fetch_budget(),
                self.fetcher.fetch(&self.request, &cursor),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => PageOutcome::End(EndReason::Timeout),
            };

            let (records, next) = match outcome {
                PageOutcome::Page { records, next } => {
                    metrics::record_fetch(started.elapsed(), "page");
                    (records, next)
                }
                PageOutcome::End(reason) => {
                    metrics::record_fetch(started.elapsed(), "end");
                    break Termination::End(reason);
                }
                PageOutcome::Fatal(err) => {
                    metrics::record_fetch(started.elapsed(), "fatal");
                    error!(error = %err, cursor = %cursor, "Fetcher failed fatally");
                    return Err(CollectError::Fetcher(err));
                }
            };

            report.pages += 1;
            if records.is_empty() {
                break Termination::End(EndReason::EmptyPage);
            }

            let (stored, duplicates, interrupted) = self.store_page(&records)?;
            report.collected += stored;
            report.duplicates += duplicates;
            metrics::record_page_records(stored, duplicates);

            debug!(
                page = report.pages,
                received = records.len(),
                stored,
                duplicates,
                seen = report.seen(),
                "Page stored"
            );

            if interrupted {
                break Termination::Interrupted;
            }
            if report.seen() > self.window.quota {
                break Termination::QuotaReached;
            }
            match next {
                Some(next) => cursor = next,
                None => break Termination::End(EndReason::Exhausted),
            }
        };

        self.log_termination(&report);
        Ok(report)
    }

    /// Append a page record by record, then make it durable
    ///
    /// Returns (stored, duplicates, interrupted).
    fn store_page(
        &mut self,
        records: &[crate::Record],
    ) -> Result<(u64, u64, bool), CollectError> {
        let mut stored = 0;
        let mut duplicates = 0;
        let mut interrupted = false;

        for record in records {
            if self.store.append(record)? {
                stored += 1;
                if let Some(bar) = self.progress_bar {
                    bar.inc(1);
                }
            } else {
                duplicates += 1;
            }

            if self.shutdown_requested() {
                interrupted = true;
                break;
            }
        }

        self.store.sync()?;
        Ok((stored, duplicates, interrupted))
    }

    fn log_termination(&self, report: &SessionReport) {
        match &report.termination {
            Termination::QuotaReached => info!(
                collected = report.collected,
                duplicates = report.duplicates,
                pages = report.pages,
                "Window quota reached"
            ),
            Termination::Interrupted => warn!(
                collected = report.collected,
                pages = report.pages,
                "Window interrupted; it will be collected again on resume"
            ),
            Termination::End(reason) => {
                let shortfall = report.shortfall();
                metrics::record_shortfall(shortfall);
                if shortfall > 0 {
                    warn!(
                        collected = report.collected,
                        duplicates = report.duplicates,
                        pages = report.pages,
                        shortfall,
                        reason = %reason,
                        "Window ended below quota"
                    );
                } else {
                    info!(
                        collected = report.collected,
                        pages = report.pages,
                        reason = %reason,
                        "Window ended"
                    );
                }
            }
        }
    }
}
