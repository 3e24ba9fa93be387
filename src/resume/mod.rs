//! Resume capability for collection runs
//!
//! Provides the versioned checkpoint with atomic replacement and the advisory
//! lock that gives one process ownership of a run directory.

pub mod checkpoint;
pub mod lock;

pub use checkpoint::{Checkpoint, CheckpointStore, RunStatus};
pub use lock::RunLock;

/// Errors related to checkpoints and run ownership
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: u32,
        /// Found schema version
        found: u32,
    },

    /// Checkpoint file too large
    #[error("checkpoint file too large: {size} bytes (max: {max} bytes)")]
    CheckpointTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// Checkpoint belongs to a different query
    #[error("query fingerprint mismatch: checkpoint has {found}, query hashes to {expected}")]
    FingerprintMismatch {
        /// Fingerprint recomputed from the stored query
        expected: String,
        /// Fingerprint recorded in the checkpoint
        found: String,
    },

    /// Checkpoint content is internally inconsistent
    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
