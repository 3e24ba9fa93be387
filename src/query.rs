//! Query parameters and run identity
//!
//! A [`Query`] is immutable once built and always valid: the search expression is
//! non-empty, the date range covers at least one day and the quota is positive.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of the run id derived from the query fingerprint
const RUN_ID_LEN: usize = 16;

/// Query validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Search expression is empty
    #[error("search expression cannot be empty")]
    EmptySearch,

    /// Date range contains no days
    #[error("until ({until}) must be after since ({since})")]
    EmptyRange {
        /// Start of the range
        since: NaiveDate,
        /// End of the range (exclusive)
        until: NaiveDate,
    },

    /// Quota is zero
    #[error("quota must be a positive integer")]
    ZeroQuota,

    /// Date string could not be parsed
    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
}

#[derive(Deserialize)]
struct RawQuery {
    search: String,
    since: NaiveDate,
    until: NaiveDate,
    quota: u64,
}

impl TryFrom<RawQuery> for Query {
    type Error = QueryError;

    fn try_from(raw: RawQuery) -> Result<Self, Self::Error> {
        Query::new(raw.search, raw.since, raw.until, raw.quota)
    }
}

/// Parameters of one collection run: search expression, `[since, until)` and quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuery")]
pub struct Query {
    search: String,
    since: NaiveDate,
    until: NaiveDate,
    quota: u64,
}

impl Query {
    /// Build a validated query
    pub fn new(
        search: impl Into<String>,
        since: NaiveDate,
        until: NaiveDate,
        quota: u64,
    ) -> Result<Self, QueryError> {
        let search = search.into();
        if search.trim().is_empty() {
            return Err(QueryError::EmptySearch);
        }
        if until <= since {
            return Err(QueryError::EmptyRange { since, until });
        }
        if quota == 0 {
            return Err(QueryError::ZeroQuota);
        }

        Ok(Self {
            search,
            since,
            until,
            quota,
        })
    }

    /// Parse a calendar date in `YYYY-MM-DD` format
    pub fn parse_date(input: &str) -> Result<NaiveDate, QueryError> {
        NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
            .map_err(|_| QueryError::InvalidDate(input.to_string()))
    }

    /// Search expression
    pub fn search(&self) -> &str {
        &self.search
    }

    /// First day of the range (inclusive)
    pub fn since(&self) -> NaiveDate {
        self.since
    }

    /// End of the range (exclusive)
    pub fn until(&self) -> NaiveDate {
        self.until
    }

    /// Overall item quota
    pub fn quota(&self) -> u64 {
        self.quota
    }

    /// Number of days in `[since, until)`
    pub fn days(&self) -> u64 {
        (self.until - self.since).num_days().max(0) as u64
    }

    /// SHA-256 over the canonical field encoding, hex encoded
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.search.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.since.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.until.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.quota.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Short run identifier, also used as the run directory name
    pub fn run_id(&self) -> String {
        self.fingerprint()[..RUN_ID_LEN].to_string()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' [{}, {}) quota={}",
            self.search, self.since, self.until, self.quota
        )
    }
}
