//! CLI error types and conversions

use crate::collector::CollectError;
use crate::fetcher::FetcherError;
use crate::metrics::MetricsError;
use crate::resume::ResumeError;
use crate::store::StoreError;
use crate::QueryError;

/// Exit code for a run stopped by an interrupt (EX_TEMPFAIL)
pub const EXIT_INTERRUPTED: i32 = 75;

/// Exit code for any fatal error
pub const EXIT_FAILURE: i32 = 1;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Query error
    #[error("query error: {0}")]
    QueryError(#[from] QueryError),

    /// Collection error
    #[error("{0}")]
    CollectError(#[from] CollectError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Store error
    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Validation found problems
    #[error("validation failed: {0}")]
    ValidationFailed(String),
}
