//! CSV dataset export

use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info};

use super::records::RecordStore;
use super::{StoreError, StoreResult};
use crate::Record;

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Rows between intermediate flushes
const FLUSH_EVERY: u64 = 1000;

/// CSV row for one record
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    url: &'a str,
    created_at: String,
    content: &'a str,
    extra: String,
}

impl<'a> TryFrom<&'a Record> for CsvRow<'a> {
    type Error = StoreError;

    fn try_from(record: &'a Record) -> Result<Self, Self::Error> {
        let extra = if record.extra.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&record.extra)
                .map_err(|e| StoreError::SerializationError(e.to_string()))?
        };

        Ok(Self {
            url: &record.url,
            created_at: record.created_at.to_rfc3339(),
            content: &record.content,
            extra,
        })
    }
}

/// Writes records as CSV with a `url,created_at,content,extra` header
pub struct CsvExporter {
    writer: Writer<BufWriter<File>>,
    rows_written: u64,
}

impl CsvExporter {
    /// Create a new exporter, replacing any existing file
    pub fn new<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Creating CSV export");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::IoError(format!("Failed to create directory: {e}")))?;
            }
        }

        let file = File::create(path)
            .map_err(|e| StoreError::IoError(format!("Failed to create file: {e}")))?;

        Ok(Self {
            writer: Writer::from_writer(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file)),
            rows_written: 0,
        })
    }

    /// Write one record
    pub fn write_record(&mut self, record: &Record) -> StoreResult<()> {
        let row = CsvRow::try_from(record)?;
        self.writer
            .serialize(&row)
            .map_err(|e| StoreError::CsvError(format!("Failed to write row: {e}")))?;

        self.rows_written += 1;
        if self.rows_written % FLUSH_EVERY == 0 {
            self.writer
                .flush()
                .map_err(|e| StoreError::IoError(format!("Failed to flush: {e}")))?;
            debug!(rows = self.rows_written, "CSV export progress");
        }
        Ok(())
    }

    /// Rows written so far
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush, sync and close the file; returns the number of rows written
    pub fn close(mut self) -> StoreResult<u64> {
        self.writer
            .flush()
            .map_err(|e| StoreError::IoError(format!("Failed to flush: {e}")))?;

        let buf_writer = self
            .writer
            .into_inner()
            .map_err(|e| StoreError::IoError(format!("Failed to get inner writer: {e}")))?;
        let file = buf_writer
            .into_inner()
            .map_err(|e| StoreError::IoError(format!("Failed to get file handle: {e}")))?;
        file.sync_all()
            .map_err(|e| StoreError::IoError(format!("Failed to sync file: {e}")))?;

        info!(rows = self.rows_written, "CSV export closed");
        Ok(self.rows_written)
    }

    /// Replay a record store into a CSV file
    ///
    /// # Returns
    /// Number of rows written
    pub fn export_store<P: AsRef<Path>, Q: AsRef<Path>>(store_path: P, output: Q) -> StoreResult<u64> {
        let mut exporter = Self::new(output)?;
        RecordStore::replay(store_path, |record| exporter.write_record(&record))?;
        exporter.close()
    }
}
