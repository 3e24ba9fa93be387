//! Per-day decomposition of a query range

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::fmt;

use crate::Query;

/// One calendar day of a run with its share of the quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubWindow {
    /// Position in the full schedule (0-based)
    pub index: usize,
    /// Day start (inclusive)
    pub since: NaiveDate,
    /// Day end (exclusive)
    pub until: NaiveDate,
    /// Items to collect in this window
    pub quota: u64,
}

impl fmt::Display for SubWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}, {})", self.index, self.since, self.until)
    }
}

/// Splits `[since, until)` into daily sub-windows, earliest first
///
/// Each window gets `floor(quota / days)`; the remainder goes to the last window so
/// the per-window quotas always sum to the overall quota.
#[derive(Debug, Clone)]
pub struct TimeWindowScheduler {
    since: NaiveDate,
    until: NaiveDate,
    quota: u64,
}

impl TimeWindowScheduler {
    /// Create a scheduler for a raw range and quota
    pub fn new(since: NaiveDate, until: NaiveDate, quota: u64) -> Self {
        Self {
            since,
            until,
            quota,
        }
    }

    /// Create a scheduler for a validated query
    pub fn for_query(query: &Query) -> Self {
        Self::new(query.since(), query.until(), query.quota())
    }

    /// Number of days in the range (zero for an empty or inverted range)
    pub fn days(&self) -> u64 {
        (self.until - self.since).num_days().max(0) as u64
    }

    /// Base quota per window, before the remainder is added to the last one
    pub fn per_window_quota(&self) -> u64 {
        match self.days() {
            0 => 0,
            days => self.quota / days,
        }
    }

    /// Full schedule
    pub fn windows(&self) -> Vec<SubWindow> {
        let days = self.days();
        if days == 0 {
            return Vec::new();
        }

        let base = self.quota / days;
        let remainder = self.quota % days;

        (0..days)
            .filter_map(|offset| {
                let since = self.since.checked_add_days(Days::new(offset))?;
                let until = since.checked_add_days(Days::new(1))?;
                let quota = if offset == days - 1 {
                    base + remainder
                } else {
                    base
                };
                Some(SubWindow {
                    index: offset as usize,
                    since,
                    until,
                    quota,
                })
            })
            .collect()
    }

    /// Windows starting at or after `boundary`, with the quotas of the full schedule
    pub fn windows_from(&self, boundary: NaiveDate) -> Vec<SubWindow> {
        self.windows()
            .into_iter()
            .filter(|window| window.since >= boundary)
            .collect()
    }
}
