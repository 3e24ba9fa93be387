//! # Timeline Harvester Library
//!
//! An incremental, checkpointed collection engine for time-ordered items served by a
//! paginated, rate-limited source (typically a search page that loads more results on
//! demand). Designed for long historical backfills that must survive crashes, stalls
//! and operator interrupts without losing or duplicating collected items.
//!
//! ## Features
//!
//! - **Per-day scheduling**: A `[since, until)` range is split into daily sub-windows,
//!   each with its own share of the overall quota
//! - **Durable appends**: Every record is written to an append-only JSON Lines store as
//!   soon as it arrives
//! - **Resume Capability**: An atomically replaced checkpoint after every sub-window
//!   allows an interrupted run to continue exactly where it stopped
//! - **Rate Limiting**: A minimum delay between consecutive page fetches
//! - **Crash-tolerant replay**: A torn trailing line never breaks reading the store
//!
//! ## Quick Start
//!
//! ```no_run
//! use timeline_harvester::collector::{CollectorConfig, RecoveryController, RunContext};
//! use timeline_harvester::fetcher::http::HttpPageFetcher;
//! use timeline_harvester::Query;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let query = Query::new(
//!     "#rust lang:en",
//!     Query::parse_date("2023-01-01")?,
//!     Query::parse_date("2023-01-04")?,
//!     30,
//! )?;
//! let config = CollectorConfig::default();
//! let fetcher = HttpPageFetcher::new("http://127.0.0.1:8080/search", &config)?;
//! let context = RunContext::new(".harvest", query, config);
//!
//! let outcome = RecoveryController::start(context, fetcher, false)?.run().await?;
//! println!("{} records stored", outcome.stored_records);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`query`] - Validated collection parameters and run identity
//! - [`fetcher`] - The page fetcher boundary and the HTTP implementation
//! - [`collector`] - Scheduling, per-window sessions, rate limiting and the recovery
//!   state machine
//! - [`store`] - Append-only record store and CSV export
//! - [`resume`] - Checkpoint persistence and run locking
//! - [`shutdown`] - Operator interrupt coordination
//! - [`metrics`] - Collection metrics

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// CLI command implementations
pub mod cli;

/// Collection orchestration
pub mod collector;

/// Page fetchers
pub mod fetcher;

/// Collection metrics
pub mod metrics;

/// Query parameters and run identity
pub mod query;

/// Checkpointing and run locking
pub mod resume;

/// Graceful shutdown coordination
pub mod shutdown;

/// Record storage and export
pub mod store;

pub use query::{Query, QueryError};

/// Schema version written with every stored record
pub const RECORD_SCHEMA_VERSION: u32 = 1;

fn default_record_version() -> u32 {
    RECORD_SCHEMA_VERSION
}

/// One collected item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Record schema version
    #[serde(rename = "v", default = "default_record_version")]
    pub schema_version: u32,
    /// Stable unique reference (e.g., the item's source URL)
    pub url: String,
    /// Creation time of the item at the source
    pub created_at: DateTime<Utc>,
    /// Free-text content
    pub content: String,
    /// Optional source-specific fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Record {
    /// Create a record with no extra fields
    pub fn new(url: impl Into<String>, created_at: DateTime<Utc>, content: impl Into<String>) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            url: url.into(),
            created_at,
            content: content.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Attach a source-specific field
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Validate record integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("Record url cannot be empty".to_string());
        }

        if self.schema_version == 0 || self.schema_version > RECORD_SCHEMA_VERSION {
            return Err(format!(
                "Unsupported record schema version {} (max {})",
                self.schema_version, RECORD_SCHEMA_VERSION
            ));
        }

        Ok(())
    }
}
