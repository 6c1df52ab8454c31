//! Metadata log implementation
//!
//! The log durably records structural lifecycle events (dimension created,
//! dimension deleted, chart deleted) before the in-memory UUID index is
//! mutated. After a crash the log is replayed to rebuild the index, so the
//! log is always the ground truth and the index a derived cache.

mod reader;
mod record;
mod segment;
mod writer;

pub use reader::{LogReader, ScanOutcome, SegmentScan};
pub use record::{LifecycleRecord, RecordKind};
pub use segment::{list_segments, segment_path, SegmentInfo};
pub use writer::{LogWriter, WriterStart};

use crate::{MetalogError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Smallest accepted segment size: header plus a few records
pub const MIN_SEGMENT_BYTES: usize = 128;

/// Metalog configuration
#[derive(Debug, Clone)]
pub struct MetalogConfig {
    /// Directory for log segments
    pub dir: PathBuf,
    /// Maximum segment size in bytes before rotation
    pub segment_max_bytes: usize,
    /// Maximum age of the active segment before rotation
    pub segment_max_age: Option<Duration>,
}

impl MetalogConfig {
    /// Reject configurations the writer cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.segment_max_bytes < MIN_SEGMENT_BYTES {
            return Err(MetalogError::Config(format!(
                "segment_max_bytes {} below minimum {}",
                self.segment_max_bytes, MIN_SEGMENT_BYTES
            )));
        }
        Ok(())
    }
}

impl Default for MetalogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/metalog"),
            segment_max_bytes: crate::config::SEGMENT_MAX_BYTES,
            segment_max_age: Some(crate::config::SEGMENT_MAX_AGE),
        }
    }
}
