//! Collection metrics
//!
//! Emitted through the `metrics` facade, so they are free when no recorder is
//! installed. `init_metrics` installs a Prometheus exporter with an HTTP scrape
//! listener for long backfills that should be watched from outside.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed (port in use, recorder already set)
    #[error("failed to install Prometheus exporter: {0}")]
    InstallError(String),
}

/// Install the Prometheus exporter and register metric descriptions
///
/// Must be called from within a tokio runtime, once per process.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g., "127.0.0.1:9000")
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    info!(%addr, "Initializing metrics exporter");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::InstallError(e.to_string()))?;

    describe_metrics();
    Ok(())
}

/// Register descriptions for every collector metric
pub fn describe_metrics() {
    describe_counter!(
        "pages_fetched_total",
        Unit::Count,
        "Pages returned by the fetcher"
    );
    describe_counter!(
        "records_stored_total",
        Unit::Count,
        "Records durably appended to the record store"
    );
    describe_counter!(
        "duplicates_skipped_total",
        Unit::Count,
        "Fetched records skipped because their url was already stored"
    );
    describe_counter!(
        "window_shortfall_records",
        Unit::Count,
        "Records a sub-window fell short of its quota"
    );
    describe_counter!(
        "checkpoints_written_total",
        Unit::Count,
        "Checkpoints atomically written"
    );
    describe_counter!(
        "runs_completed_total",
        Unit::Count,
        "Runs that processed their whole range"
    );
    describe_counter!(
        "runs_interrupted_total",
        Unit::Count,
        "Runs stopped by an operator interrupt"
    );
    describe_histogram!(
        "fetch_duration_seconds",
        Unit::Seconds,
        "Duration of one page fetch"
    );
}

/// Record one page fetch and how it ended
pub fn record_fetch(duration: Duration, outcome: &'static str) {
    histogram!("fetch_duration_seconds", "outcome" => outcome).record(duration.as_secs_f64());
    if outcome == "page" {
        counter!("pages_fetched_total").increment(1);
    }
}

/// Record stored and skipped records for one page
pub fn record_page_records(stored: u64, duplicates: u64) {
    counter!("records_stored_total").increment(stored);
    if duplicates > 0 {
        counter!("duplicates_skipped_total").increment(duplicates);
    }
}

/// Record a sub-window that ended below its quota
pub fn record_shortfall(shortfall: u64) {
    if shortfall > 0 {
        counter!("window_shortfall_records").increment(shortfall);
    }
}

/// Record a checkpoint write
pub fn record_checkpoint_written() {
    counter!("checkpoints_written_total").increment(1);
}

/// Run-level metrics
pub struct RunMetrics {
    run_id: String,
    start_time: Instant,
}

impl RunMetrics {
    /// Start tracking a run
    pub fn start(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            start_time: Instant::now(),
        }
    }

    /// Record a run that processed its whole range
    pub fn record_done(&self, stored_records: u64, shortfall: u64) {
        counter!("runs_completed_total").increment(1);
        info!(
            run_id = %self.run_id,
            stored_records,
            shortfall,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Run completed"
        );
    }

    /// Record a run stopped by an interrupt
    pub fn record_interrupted(&self, stored_records: u64) {
        counter!("runs_interrupted_total").increment(1);
        warn!(
            run_id = %self.run_id,
            stored_records,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Run interrupted; resume from the checkpoint to continue"
        );
    }
}
