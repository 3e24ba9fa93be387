//! Append-only JSON Lines record store
//!
//! One record per newline-terminated line. Appends are written to the OS as they
//! arrive; [`RecordStore::sync`] makes them durable. A crash can leave at most one
//! unterminated trailing line, which replay ignores and [`RecordStore::open`] truncates.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{StoreError, StoreResult};
use crate::Record;

/// Result of streaming through a store file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Complete records decoded
    pub records: u64,
    /// Length of the valid, newline-terminated prefix in bytes
    pub valid_bytes: u64,
    /// Whether an unterminated trailing line was found
    pub torn_tail: bool,
}

/// Durable append-only record log for one run
///
/// Records are streamed to disk and never held in memory, but `seen_urls` keeps
/// every stored url for deduplication. It is the one structure that grows with the
/// store, roughly url length per record.
pub struct RecordStore {
    path: PathBuf,
    file: File,
    count: u64,
    seen_urls: HashSet<String>,
    dirty: bool,
}

impl RecordStore {
    /// Create an empty store, replacing any existing file
    pub fn create<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::IoError(format!("Failed to create directory: {e}")))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| StoreError::IoError(format!("Failed to create store: {e}")))?;
        file.sync_all()
            .map_err(|e| StoreError::IoError(format!("Failed to sync store: {e}")))?;

        info!(path = %path.display(), "Created record store");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            count: 0,
            seen_urls: HashSet::new(),
            dirty: false,
        })
    }

    /// Open an existing store for appending
    ///
    /// Replays the file to rebuild the record count and the set of stored urls.
    /// A torn trailing line is truncated before any new append.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let mut seen_urls = HashSet::new();
        let summary = Self::replay(path, |record| {
            seen_urls.insert(record.url);
            Ok(())
        })?;

        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| StoreError::IoError(format!("Failed to open store: {e}")))?;

        if summary.torn_tail {
            warn!(
                path = %path.display(),
                valid_bytes = summary.valid_bytes,
                "Truncating torn trailing record left by an interrupted write"
            );
            file.set_len(summary.valid_bytes)
                .map_err(|e| StoreError::IoError(format!("Failed to truncate torn tail: {e}")))?;
            file.sync_all()
                .map_err(|e| StoreError::IoError(format!("Failed to sync store: {e}")))?;
        }

        info!(
            path = %path.display(),
            records = summary.records,
            unique_urls = seen_urls.len(),
            "Opened record store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            count: summary.records,
            seen_urls,
            dirty: false,
        })
    }

    /// Stream every complete record in the file to `visit`
    ///
    /// Memory use is bounded by one line. Stops quietly at an unterminated final line;
    /// a terminated line that fails to decode is [`StoreError::Corrupt`].
    pub fn replay<P, F>(path: P, mut visit: F) -> StoreResult<ReplaySummary>
    where
        P: AsRef<Path>,
        F: FnMut(Record) -> StoreResult<()>,
    {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| StoreError::IoError(format!("Failed to open {}: {e}", path.display())))?;
        let mut reader = BufReader::new(file);

        let mut summary = ReplaySummary::default();
        let mut line = Vec::new();
        let mut line_no = 0u64;

        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| StoreError::IoError(format!("Failed to read store: {e}")))?;
            if read == 0 {
                break;
            }
            line_no += 1;

            if line.last() != Some(&b'\n') {
                debug!(line = line_no, bytes = read, "Ignoring unterminated trailing line");
                summary.torn_tail = true;
                break;
            }

            let body = &line[..line.len() - 1];
            if !body.iter().all(u8::is_ascii_whitespace) {
                let record: Record =
                    serde_json::from_slice(body).map_err(|e| StoreError::Corrupt {
                        line: line_no,
                        reason: e.to_string(),
                    })?;
                visit(record)?;
                summary.records += 1;
            }
            summary.valid_bytes += read as u64;
        }

        Ok(summary)
    }

    /// Count complete records without opening the store for writing
    pub fn count_records<P: AsRef<Path>>(path: P) -> StoreResult<u64> {
        Ok(Self::replay(path, |_| Ok(()))?.records)
    }

    /// Append one record
    ///
    /// Returns `false` without writing when a record with the same url is already stored.
    /// The line is handed to the OS immediately; call [`RecordStore::sync`] for durability.
    pub fn append(&mut self, record: &Record) -> StoreResult<bool> {
        record.validate().map_err(StoreError::InvalidRecord)?;

        if self.seen_urls.contains(&record.url) {
            return Ok(false);
        }

        let mut line = serde_json::to_vec(record)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        line.push(b'\n');

        self.file
            .write_all(&line)
            .map_err(|e| StoreError::IoError(format!("Failed to append record: {e}")))?;

        self.seen_urls.insert(record.url.clone());
        self.count += 1;
        self.dirty = true;
        Ok(true)
    }

    /// Flush appended records to stable storage
    pub fn sync(&mut self) -> StoreResult<()> {
        if !self.dirty {
            return Ok(());
        }
        self.file
            .sync_data()
            .map_err(|e| StoreError::IoError(format!("Failed to sync store: {e}")))?;
        self.dirty = false;
        Ok(())
    }

    /// Whether a record with this url is already stored
    pub fn contains(&self, url: &str) -> bool {
        self.seen_urls.contains(url)
    }

    /// Number of records in the store
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Store file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
