//! Throttled `[PROGRESS]` reporting for long backfills.
//!
//! A range of several months runs for hours under the default rate limit.
//! [`ProgressState`] counts stored records against the quota and reports when the
//! share grows by `step_pct` points, or every `heartbeat` once the run is past its
//! warm-up period.

use std::time::{Duration, Instant};

const HEARTBEAT: Duration = Duration::from_secs(60);
const WARM_UP: Duration = Duration::from_secs(30);
const STEP_PCT: f64 = 10.0;

/// Progress counters and report cadence for one run.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Stored by this process.
    stored_now: u64,
    /// Already in the store at start or resume.
    baseline: u64,
    quota: u64,
    started: Instant,
    last_report: Instant,
    heartbeat: Duration,
    /// Records per second since `started`.
    rate: f64,
    window_label: Option<String>,
    reported_pct: f64,
    step_pct: f64,
}

impl ProgressState {
    /// Start tracking against `quota`, with `baseline` records already stored.
    pub fn new(quota: u64, baseline: u64) -> Self {
        let now = Instant::now();
        let mut state = Self {
            stored_now: 0,
            baseline,
            quota,
            started: now,
            last_report: now,
            heartbeat: HEARTBEAT,
            rate: 0.0,
            window_label: None,
            reported_pct: 0.0,
            step_pct: STEP_PCT,
        };
        // A resumed run starts reporting from where it already is
        state.reported_pct = state.quota_share();
        state
    }

    /// Add records stored by the last window.
    pub fn record_stored(&mut self, count: u64) {
        self.stored_now = self.stored_now.saturating_add(count);
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.rate = self.stored_now as f64 / secs;
        }
    }

    /// Whether a `[PROGRESS]` line should be logged now.
    pub fn is_due(&self) -> bool {
        if self.stored_now == 0 {
            return false;
        }
        if self.quota_share() - self.reported_pct >= self.step_pct {
            return true;
        }
        self.started.elapsed() >= WARM_UP && self.last_report.elapsed() >= self.heartbeat
    }

    /// Call after logging a line.
    pub fn mark_reported(&mut self) {
        self.last_report = Instant::now();
        self.reported_pct = self.quota_share();
    }

    /// Label for the window being collected, e.g. "Day 3/30".
    pub fn set_window_label(&mut self, label: impl Into<String>) {
        self.window_label = Some(label.into());
    }

    /// Records in the store, including those from before a resume.
    pub fn total_stored(&self) -> u64 {
        self.baseline + self.stored_now
    }

    /// Percent of the quota held in the store, capped at 100.
    pub fn quota_share(&self) -> f64 {
        match self.quota {
            0 => 100.0,
            quota => (self.total_stored() as f64 * 100.0 / quota as f64).min(100.0),
        }
    }

    fn eta(&self) -> Option<Duration> {
        let left = self.quota.saturating_sub(self.total_stored());
        (self.rate > 0.0 && left > 0).then(|| Duration::from_secs_f64(left as f64 / self.rate))
    }

    /// The `[PROGRESS]` log line.
    pub fn report_line(&self) -> String {
        let mut line = format!(
            "[PROGRESS] Collected {} records - {:.1}% of quota",
            self.total_stored(),
            self.quota_share()
        );
        if let Some(label) = &self.window_label {
            line.push_str(&format!(" ({label})"));
        }
        if self.rate > 0.0 {
            line.push_str(&format!(" at {:.1} records/sec", self.rate));
        }
        if let Some(eta) = self.eta() {
            line.push_str(&format!(" - ~{} remaining", short_duration(eta)));
        }
        line
    }
}

fn short_duration(d: Duration) -> String {
    match d.as_secs() {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s => format!("{:.1}h", s as f64 / 3600.0),
    }
}
