//! Record storage and export
//!
//! - [`records`] - Append-only JSON Lines store, the authoritative record of collected items
//! - [`csv`] - Dataset export for downstream analytics

pub mod csv;
pub mod records;

pub use self::csv::CsvExporter;
pub use records::{RecordStore, ReplaySummary};

/// Record store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// A complete line could not be decoded
    #[error("corrupt record at line {line}: {reason}")]
    Corrupt {
        /// 1-based line number
        line: u64,
        /// Decoder message
        reason: String,
    },

    /// Record failed validation before write
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
