//! Error types for the metalog

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for metalog operations
pub type Result<T> = std::result::Result<T, MetalogError>;

/// Metalog error types
#[derive(Error, Debug)]
pub enum MetalogError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecoverable damage in the log (bad header, sealed-segment damage,
    /// sequence regression)
    #[error("Log corruption: {0}")]
    Corruption(String),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Invalid data format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Record framing cut short; the expected outcome of a crash mid-write
    /// at the tail of the active segment
    #[error("Incomplete record: {0}")]
    IncompleteRecord(String),

    /// Two live dimensions may never share a UUID
    #[error("UUID {uuid} already bound to a different live dimension")]
    UuidConflict { uuid: Uuid },

    /// Operation on an instance that has been shut down
    #[error("Metalog instance is closed")]
    InstanceClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MetalogError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, MetalogError::Io(_))
    }

    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            MetalogError::Corruption(_) | MetalogError::ChecksumMismatch { .. }
        )
    }

    /// Check if error indicates a truncated in-flight write rather than
    /// storage damage
    pub fn is_incomplete(&self) -> bool {
        matches!(self, MetalogError::IncompleteRecord(_))
    }
}
