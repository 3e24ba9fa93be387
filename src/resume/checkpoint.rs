//! Checkpoint persistence
//!
//! The checkpoint is a single pretty-printed JSON document replaced atomically after
//! every completed sub-window: temp file in the same directory, fsync, rename, then
//! fsync of the directory. Readers therefore see either the previous or the new
//! checkpoint, never a partial one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::ResumeError;
use crate::Query;

/// Current checkpoint schema version
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Maximum accepted checkpoint size (1 MiB); a checkpoint is a few hundred bytes
pub const MAX_CHECKPOINT_FILE_SIZE: u64 = 1024 * 1024;

/// Lifecycle status recorded in a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Windows remain in `[boundary, until)`
    Running,
    /// The whole range has been processed
    Done,
}

/// Persistent record of run progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint schema version
    pub schema_version: u32,
    /// Short run identifier (run directory name)
    pub run_id: String,
    /// Full query fingerprint
    pub fingerprint: String,
    /// Original query
    pub query: Query,
    /// First day of the unprocessed range `[boundary, until)`
    pub boundary: NaiveDate,
    /// `quota - stored_records`, saturating at zero
    pub remaining_quota: u64,
    /// Records in the store when the checkpoint was written
    pub stored_records: u64,
    /// Sub-windows completed so far
    pub completed_windows: u64,
    /// Run status
    pub status: RunStatus,
    /// Cumulative per-window shortfall
    pub shortfall: u64,
    /// When the run was started
    pub created_at: DateTime<Utc>,
    /// When this checkpoint was written
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Initial checkpoint for a fresh run
    pub fn new(query: &Query) -> Self {
        let now = Utc::now();
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            run_id: query.run_id(),
            fingerprint: query.fingerprint(),
            query: query.clone(),
            boundary: query.since(),
            remaining_quota: query.quota(),
            stored_records: 0,
            completed_windows: 0,
            status: RunStatus::Running,
            shortfall: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a completed sub-window ending at `window_until`
    pub fn advance(&mut self, window_until: NaiveDate, stored_records: u64, window_shortfall: u64) {
        self.boundary = window_until;
        self.completed_windows += 1;
        self.shortfall += window_shortfall;
        self.set_stored_records(stored_records);
        if self.boundary >= self.query.until() {
            self.status = RunStatus::Done;
        }
        self.updated_at = Utc::now();
    }

    /// Update the stored record count and recompute the remaining quota from it
    pub fn set_stored_records(&mut self, stored_records: u64) {
        self.stored_records = stored_records;
        self.remaining_quota = self.query.quota().saturating_sub(stored_records);
    }

    /// Mark the whole range as processed
    pub fn mark_done(&mut self) {
        self.boundary = self.query.until();
        self.status = RunStatus::Done;
        self.updated_at = Utc::now();
    }

    /// Whether the run has processed its whole range
    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }

    /// Check identity and internal consistency
    pub fn verify(&self) -> Result<(), ResumeError> {
        let expected = self.query.fingerprint();
        if self.fingerprint != expected {
            return Err(ResumeError::FingerprintMismatch {
                expected,
                found: self.fingerprint.clone(),
            });
        }

        if self.run_id != self.query.run_id() {
            return Err(ResumeError::InvalidCheckpoint(format!(
                "run id {} does not match query fingerprint",
                self.run_id
            )));
        }

        if self.boundary < self.query.since() || self.boundary > self.query.until() {
            return Err(ResumeError::InvalidCheckpoint(format!(
                "boundary {} outside query range [{}, {})",
                self.boundary,
                self.query.since(),
                self.query.until()
            )));
        }

        if self.remaining_quota != self.query.quota().saturating_sub(self.stored_records) {
            return Err(ResumeError::InvalidCheckpoint(format!(
                "remaining quota {} inconsistent with quota {} and {} stored records",
                self.remaining_quota,
                self.query.quota(),
                self.stored_records
            )));
        }

        Ok(())
    }
}

/// Reads and atomically replaces the checkpoint file of one run
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Checkpoint store at `path`
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Checkpoint file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a checkpoint file exists
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Atomically replace the checkpoint
    pub fn write(&self, checkpoint: &Checkpoint) -> Result<(), ResumeError> {
        let path = self.path.as_path();
        debug!(
            path = %path.display(),
            boundary = %checkpoint.boundary,
            "Writing checkpoint"
        );

        let parent_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create directory: {e}")))?;

        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        // Make the rename itself durable
        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        info!(
            path = %path.display(),
            boundary = %checkpoint.boundary,
            stored_records = checkpoint.stored_records,
            remaining_quota = checkpoint.remaining_quota,
            status = ?checkpoint.status,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Read and validate the checkpoint
    pub fn read(&self) -> Result<Checkpoint, ResumeError> {
        let path = self.path.as_path();
        debug!(path = %path.display(), "Loading checkpoint");

        let metadata = std::fs::metadata(path).map_err(|e| {
            ResumeError::IoError(format!("Failed to read {}: {e}", path.display()))
        })?;
        if metadata.len() > MAX_CHECKPOINT_FILE_SIZE {
            return Err(ResumeError::CheckpointTooLarge {
                size: metadata.len(),
                max: MAX_CHECKPOINT_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let value: serde_json::Value = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, "Failed to parse checkpoint");
            ResumeError::DeserializationError(e.to_string())
        })?;

        let found = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| {
                ResumeError::DeserializationError("missing schema_version".to_string())
            })?;
        if found != u64::from(CHECKPOINT_SCHEMA_VERSION) {
            warn!(
                found_version = found,
                expected_version = CHECKPOINT_SCHEMA_VERSION,
                "Checkpoint schema version mismatch"
            );
            return Err(ResumeError::SchemaVersionMismatch {
                expected: CHECKPOINT_SCHEMA_VERSION,
                found: u32::try_from(found).unwrap_or(u32::MAX),
            });
        }

        let checkpoint: Checkpoint = serde_json::from_value(value).map_err(|e| {
            warn!(error = %e, "Failed to deserialize checkpoint");
            ResumeError::DeserializationError(e.to_string())
        })?;

        info!(
            run_id = %checkpoint.run_id,
            boundary = %checkpoint.boundary,
            stored_records = checkpoint.stored_records,
            status = ?checkpoint.status,
            "Checkpoint loaded"
        );
        Ok(checkpoint)
    }
}
