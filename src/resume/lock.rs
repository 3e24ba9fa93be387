//! Run directory ownership
//!
//! Advisory, non-blocking exclusive lock using fd-lock. The lock lives as long as
//! the [`RunLock`] value and is released by the OS if the process dies.

use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ResumeError;
use crate::collector::config::LOCK_FILE_NAME;

/// Exclusive ownership of one run directory
pub struct RunLock {
    _lock: RwLock<File>,
    path: PathBuf,
}

impl RunLock {
    /// Try to take the run directory lock without blocking
    ///
    /// Fails immediately when another process (or another handle in this process)
    /// already owns the run.
    pub fn try_acquire(run_dir: &Path) -> Result<Self, ResumeError> {
        std::fs::create_dir_all(run_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create run directory: {e}")))?;

        let path = run_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);
        let guard = lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "run directory {} is in use by another process: {e}",
                run_dir.display()
            ))
        })?;
        // Keep the lock until the file handle closes rather than until the guard drops
        std::mem::forget(guard);

        debug!(path = %path.display(), "Acquired run lock");
        Ok(Self { _lock: lock, path })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
