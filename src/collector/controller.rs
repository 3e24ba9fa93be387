//! Run lifecycle: fresh start, resume and per-window checkpointing
//!
//! State machine: `Init -> Running(i) -> Checkpointed(i) -> ... -> Done`, with
//! `Interrupted` as the other terminal state. A window that ends short of its quota
//! is reported, never treated as a run failure.
//!
//! The checkpoint is only written between windows, after the store has been synced,
//! so a crash at any point leaves a checkpoint from which the run can be replayed:
//! at worst the window in flight is fetched again, and records it had already
//! stored are recognised by url and skipped.

use indicatif::ProgressBar;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn, Instrument};

use super::config::{CollectorConfig, CHECKPOINT_FILE_NAME, LOCK_FILE_NAME, STORE_FILE_NAME};
use super::progress::ProgressState;
use super::rate_limit::RateLimiter;
use super::schedule::TimeWindowScheduler;
use super::session::{CollectionSession, SessionReport, Termination};
use super::CollectError;
use crate::fetcher::PageFetcher;
use crate::metrics::{self, RunMetrics};
use crate::resume::{Checkpoint, CheckpointStore, RunLock};
use crate::shutdown::SharedShutdown;
use crate::store::RecordStore;
use crate::Query;

/// Everything a fresh run needs
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Root directory holding one subdirectory per run
    pub data_dir: PathBuf,
    /// What to collect
    pub query: Query,
    /// Tunables
    pub config: CollectorConfig,
}

impl RunContext {
    /// Create a run context
    pub fn new<P: Into<PathBuf>>(data_dir: P, query: Query, config: CollectorConfig) -> Self {
        Self {
            data_dir: data_dir.into(),
            query,
            config,
        }
    }

    /// Directory of this run (`<data_dir>/<run_id>`)
    pub fn run_dir(&self) -> PathBuf {
        self.data_dir.join(self.query.run_id())
    }
}

/// File layout of one run directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// Run directory
    pub run_dir: PathBuf,
    /// Record store
    pub store: PathBuf,
    /// Checkpoint
    pub checkpoint: PathBuf,
}

impl RunPaths {
    /// Layout under `run_dir`
    pub fn new<P: Into<PathBuf>>(run_dir: P) -> Self {
        let run_dir = run_dir.into();
        Self {
            store: run_dir.join(STORE_FILE_NAME),
            checkpoint: run_dir.join(CHECKPOINT_FILE_NAME),
            run_dir,
        }
    }

    /// Layout of the run that owns `checkpoint`
    pub fn for_checkpoint(checkpoint: &Path) -> Self {
        let run_dir = match checkpoint.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            store: run_dir.join(STORE_FILE_NAME),
            checkpoint: checkpoint.to_path_buf(),
            run_dir,
        }
    }
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Store and checkpoint are open; no window started yet
    Init,
    /// Collecting the window with this index
    Running(usize),
    /// The window with this index is durably checkpointed
    Checkpointed(usize),
    /// The whole range has been processed
    Done,
    /// Stopped by an operator interrupt
    Interrupted,
}

/// Terminal outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTermination {
    /// Every window was processed
    Done,
    /// Stopped early; resumable from the checkpoint
    Interrupted,
}

/// Summary of a finished (or interrupted) run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// How the run ended
    pub termination: RunTermination,
    /// Run identifier
    pub run_id: String,
    /// Checkpoint to resume from
    pub checkpoint_path: PathBuf,
    /// Records in the store
    pub stored_records: u64,
    /// Cumulative shortfall over completed windows
    pub shortfall: u64,
    /// Sessions executed by this process, in order
    pub windows: Vec<SessionReport>,
}

/// Drives a run across its windows and keeps the checkpoint current
pub struct RecoveryController<F: PageFetcher> {
    query: Query,
    config: CollectorConfig,
    paths: RunPaths,
    fetcher: F,
    store: RecordStore,
    checkpoints: CheckpointStore,
    checkpoint: Checkpoint,
    limiter: RateLimiter,
    state: RunState,
    shutdown: Option<SharedShutdown>,
    progress_bar: Option<ProgressBar>,
    _lock: RunLock,
}

impl<F: PageFetcher> RecoveryController<F> {
    /// Prepare a fresh run
    ///
    /// Creates `<data_dir>/<run_id>/` with an empty store and an initial checkpoint.
    /// Refuses to touch an existing run unless `force` is set, in which case the run
    /// directory is cleared first.
    pub fn start(context: RunContext, fetcher: F, force: bool) -> Result<Self, CollectError> {
        context.config.validate()?;

        let paths = RunPaths::new(context.run_dir());
        let lock = RunLock::try_acquire(&paths.run_dir)?;
        let checkpoints = CheckpointStore::new(&paths.checkpoint);

        if checkpoints.exists() {
            if !force {
                return Err(CollectError::RunExists(paths.run_dir));
            }
            warn!(run_dir = %paths.run_dir.display(), "Discarding existing run (--force)");
            clear_run_dir(&paths.run_dir)?;
        }

        let scheduler = TimeWindowScheduler::for_query(&context.query);
        if scheduler.per_window_quota() == 0 {
            warn!(
                quota = context.query.quota(),
                days = scheduler.days(),
                "Quota is smaller than the number of days; early windows get no quota"
            );
        }

        let store = RecordStore::create(&paths.store)?;
        let checkpoint = Checkpoint::new(&context.query);
        checkpoints.write(&checkpoint)?;
        metrics::record_checkpoint_written();

        info!(
            run_id = %checkpoint.run_id,
            run_dir = %paths.run_dir.display(),
            query = %context.query,
            windows = scheduler.days(),
            "Starting fresh run"
        );

        Ok(Self::assemble(
            context.query,
            context.config,
            paths,
            fetcher,
            store,
            checkpoints,
            checkpoint,
            lock,
        ))
    }

    /// Prepare to continue the run that owns `checkpoint_path`
    ///
    /// The checkpoint must be readable, of the current schema and consistent with its
    /// query. The remaining quota is recomputed from the record store.
    pub fn resume(
        checkpoint_path: &Path,
        fetcher: F,
        config: CollectorConfig,
    ) -> Result<Self, CollectError> {
        config.validate()?;

        if !checkpoint_path.is_file() {
            return Err(CollectError::CheckpointNotFound(checkpoint_path.to_path_buf()));
        }

        let paths = RunPaths::for_checkpoint(checkpoint_path);
        let lock = RunLock::try_acquire(&paths.run_dir)?;
        let checkpoints = CheckpointStore::new(&paths.checkpoint);
        let mut checkpoint = checkpoints.read()?;
        checkpoint.verify()?;

        let store = RecordStore::open(&paths.store)?;
        let already_collected = store.count();
        let remaining = checkpoint.query.quota().saturating_sub(already_collected);
        if remaining != checkpoint.remaining_quota {
            warn!(
                checkpoint_remaining = checkpoint.remaining_quota,
                store_remaining = remaining,
                stored_records = already_collected,
                "Checkpoint remaining quota disagrees with the record store; using the store"
            );
        }
        checkpoint.set_stored_records(already_collected);

        info!(
            run_id = %checkpoint.run_id,
            boundary = %checkpoint.boundary,
            already_collected,
            remaining_quota = checkpoint.remaining_quota,
            "Resuming run"
        );

        let query = checkpoint.query.clone();
        Ok(Self::assemble(
            query,
            config,
            paths,
            fetcher,
            store,
            checkpoints,
            checkpoint,
            lock,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        query: Query,
        config: CollectorConfig,
        paths: RunPaths,
        fetcher: F,
        store: RecordStore,
        checkpoints: CheckpointStore,
        checkpoint: Checkpoint,
        lock: RunLock,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(config.rate_limit),
            query,
            config,
            paths,
            fetcher,
            store,
            checkpoints,
            checkpoint,
            state: RunState::Init,
            shutdown: None,
            progress_bar: None,
            _lock: lock,
        }
    }

    /// Attach a shared shutdown handle for graceful cancellation
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Report stored records on a progress bar
    pub fn with_progress_bar(mut self, progress_bar: ProgressBar) -> Self {
        self.progress_bar = Some(progress_bar);
        self
    }

    /// Current checkpoint
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Run directory layout
    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// Current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Process every remaining window
    ///
    /// The fetcher is closed before returning, whatever the outcome.
    pub async fn run(mut self) -> Result<RunOutcome, CollectError> {
        let span = info_span!("run", run_id = %self.checkpoint.run_id);
        let result = self.execute().instrument(span).await;

        if let Err(e) = self.fetcher.close().await {
            warn!(error = %e, "Failed to close fetcher");
        }
        if let Some(bar) = &self.progress_bar {
            bar.finish_and_clear();
        }
        result
    }

    async fn execute(&mut self) -> Result<RunOutcome, CollectError> {
        let run_metrics = RunMetrics::start(&self.checkpoint.run_id);
        let mut reports = Vec::new();

        if self.checkpoint.is_done() {
            info!("Run already complete; nothing to collect");
            self.transition(RunState::Done);
            return Ok(self.outcome(RunTermination::Done, reports));
        }

        let scheduler = TimeWindowScheduler::for_query(&self.query);
        let windows = scheduler.windows_from(self.checkpoint.boundary);
        let total_windows = scheduler.days();
        let mut progress = ProgressState::new(self.query.quota(), self.store.count());
        if let Some(bar) = &self.progress_bar {
            bar.set_length(self.query.quota());
            bar.set_position(self.store.count().min(self.query.quota()));
        }

        for window in windows {
            if self.shutdown_requested() {
                return self.interrupted(&run_metrics, reports);
            }

            self.transition(RunState::Running(window.index));
            progress.set_window_label(format!("Day {}/{}", window.index + 1, total_windows));

            let report = CollectionSession::new(
                &self.query,
                window,
                &mut self.fetcher,
                &mut self.store,
                &mut self.limiter,
                &self.config,
            )
            .with_shutdown(self.shutdown.as_deref())
            .with_progress_bar(self.progress_bar.as_ref())
            .run()
            .await?;

            progress.record_stored(report.collected);
            if progress.is_due() {
                info!("{}", progress.report_line());
                progress.mark_reported();
            }

            if report.termination == Termination::Interrupted {
                reports.push(report);
                return self.interrupted(&run_metrics, reports);
            }

            self.store.sync()?;
            self.checkpoint
                .advance(window.until, self.store.count(), report.shortfall());
            self.checkpoints.write(&self.checkpoint)?;
            metrics::record_checkpoint_written();
            self.transition(RunState::Checkpointed(window.index));
            reports.push(report);
        }

        if !self.checkpoint.is_done() {
            // Only reachable for a range with no windows
            self.checkpoint.mark_done();
            self.checkpoints.write(&self.checkpoint)?;
            metrics::record_checkpoint_written();
        }

        self.transition(RunState::Done);
        run_metrics.record_done(self.store.count(), self.checkpoint.shortfall);
        Ok(self.outcome(RunTermination::Done, reports))
    }

    fn interrupted(
        &mut self,
        run_metrics: &RunMetrics,
        reports: Vec<SessionReport>,
    ) -> Result<RunOutcome, CollectError> {
        self.store.sync()?;
        self.transition(RunState::Interrupted);
        run_metrics.record_interrupted(self.store.count());
        Ok(self.outcome(RunTermination::Interrupted, reports))
    }

    fn outcome(&self, termination: RunTermination, windows: Vec<SessionReport>) -> RunOutcome {
        RunOutcome {
            termination,
            run_id: self.checkpoint.run_id.clone(),
            checkpoint_path: self.paths.checkpoint.clone(),
            stored_records: self.store.count(),
            shortfall: self.checkpoint.shortfall,
            windows,
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "Run state transition");
        self.state = next;
    }
}

/// Remove everything in a run directory except the lock file
fn clear_run_dir(run_dir: &Path) -> Result<(), CollectError> {
    let entries = std::fs::read_dir(run_dir).map_err(|e| {
        crate::resume::ResumeError::IoError(format!("Failed to read run directory: {e}"))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            crate::resume::ResumeError::IoError(format!("Failed to read run directory: {e}"))
        })?;
        if entry.file_name() == LOCK_FILE_NAME {
            continue;
        }
        let path = entry.path();
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removed.map_err(|e| {
            crate::resume::ResumeError::IoError(format!(
                "Failed to remove {}: {e}",
                path.display()
            ))
        })?;
    }
    Ok(())
}
