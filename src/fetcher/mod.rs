//! Page fetchers
//!
//! A [`PageFetcher`] turns one page request into a [`PageOutcome`]. The collector never
//! sees transport details: everything a source can report collapses into "here is a
//! page", "this window is over" or "the run cannot continue".
//!
//! - [`http`] - Fetcher for a JSON page endpoint (e.g., a browser-automation sidecar)

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::collector::schedule::SubWindow;
use crate::{Query, Record};

pub mod http;

pub use http::HttpPageFetcher;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Network error
    #[error("network error: {0}")]
    NetworkError(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Endpoint is not a usable URL
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Underlying driver or client failure
    #[error("driver error: {0}")]
    DriverError(String),
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Opaque pagination position
///
/// The start cursor carries no token. Any other cursor is whatever the source
/// handed back with the previous page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(Option<String>);

impl Cursor {
    /// First page of a window
    pub fn start() -> Self {
        Self(None)
    }

    /// Cursor for a source-provided token
    pub fn token(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Token to send to the source, `None` for the first page
    pub fn as_token(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Whether this is the start cursor
    pub fn is_start(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(token) => f.write_str(token),
            None => f.write_str("<start>"),
        }
    }
}

/// What to fetch: the search expression restricted to one sub-window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Search expression
    pub search: String,
    /// Window start (inclusive)
    pub since: NaiveDate,
    /// Window end (exclusive)
    pub until: NaiveDate,
}

impl FetchRequest {
    /// Request for one sub-window of a query
    pub fn for_window(query: &Query, window: &SubWindow) -> Self {
        Self {
            search: query.search().to_string(),
            since: window.since,
            until: window.until,
        }
    }
}

/// Why a window ended before its quota was reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The source reported no further results
    Exhausted,
    /// A page came back with no records
    EmptyPage,
    /// The fetch did not finish within the configured timeout
    Timeout,
    /// A recoverable failure (missing element, bounded retries exhausted, bad body)
    Transient(String),
    /// The per-window page budget was spent
    PageLimit,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => f.write_str("no more results"),
            Self::EmptyPage => f.write_str("empty page"),
            Self::Timeout => f.write_str("fetch timed out"),
            Self::Transient(reason) => write!(f, "transient failure: {reason}"),
            Self::PageLimit => f.write_str("page limit reached"),
        }
    }
}

/// Result of fetching one page
#[derive(Debug)]
pub enum PageOutcome {
    /// A page of records; `next == None` means the source has no further pages
    Page {
        /// Records in source order
        records: Vec<Record>,
        /// Cursor for the following page
        next: Option<Cursor>,
    },
    /// The window is over; not an error for the run
    End(EndReason),
    /// Unrecoverable failure; the run halts
    Fatal(FetcherError),
}

/// Source of result pages
///
/// Implementations must tolerate being called again with a cursor they have already
/// served, since a resumed run re-fetches a window that was interrupted midway.
#[async_trait]
pub trait PageFetcher: Send {
    /// Fetch the page at `cursor` for `request`
    async fn fetch(&mut self, request: &FetchRequest, cursor: &Cursor) -> PageOutcome;

    /// Release any underlying resource (browser session, connection pool)
    async fn close(&mut self) -> FetcherResult<()> {
        Ok(())
    }
}
