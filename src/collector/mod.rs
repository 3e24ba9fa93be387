//! Collection orchestration
//!
//! This module drives a run from a validated [`Query`](crate::Query) to a completed,
//! checkpointed record store.
//!
//! # Overview
//!
//! 1. **Scheduling**: [`schedule::TimeWindowScheduler`] splits the range into daily
//!    [`schedule::SubWindow`]s, each with a share of the quota
//! 2. **Collection**: [`session::CollectionSession`] pages through one window, appending
//!    every record to the store as it arrives
//! 3. **Pacing**: [`rate_limit::RateLimiter`] keeps a minimum delay between fetches
//! 4. **Recovery**: [`controller::RecoveryController`] starts fresh runs, resumes
//!    interrupted ones and writes a checkpoint after every window
//! 5. **Progress**: [`progress::ProgressState`] emits periodic progress lines
//!
//! # Error Handling
//!
//! Everything a source can do wrong short of an unrecoverable failure ends the current
//! window with a logged shortfall. Storage and checkpoint failures are fatal:
//! continuing without durable state would risk silent data loss.

pub mod config;
pub mod controller;
pub mod progress;
pub mod rate_limit;
pub mod schedule;
pub mod session;

pub use config::CollectorConfig;
pub use controller::{RecoveryController, RunContext, RunOutcome, RunState, RunTermination};
pub use rate_limit::RateLimiter;
pub use schedule::{SubWindow, TimeWindowScheduler};
pub use session::{CollectionSession, SessionReport, Termination};

use std::path::PathBuf;

use crate::fetcher::FetcherError;
use crate::resume::ResumeError;
use crate::store::StoreError;
use crate::QueryError;

/// Collection errors
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Invalid tunables
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invalid query
    #[error("invalid query: {0}")]
    Query(#[from] QueryError),

    /// Record store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Checkpoint or lock failure
    #[error("resume error: {0}")]
    Resume(#[from] ResumeError),

    /// Unrecoverable fetcher failure
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),

    /// A fresh start found an existing checkpoint
    #[error("a run already exists at {0}; resume it or start again with --force")]
    RunExists(PathBuf),

    /// Resume target does not exist
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(PathBuf),
}
