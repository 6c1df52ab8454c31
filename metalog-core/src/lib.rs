//! Metalog - metadata write-ahead log for time-series storage engines
//!
//! The metalog durably records structural lifecycle events for monitored
//! entities (charts and their dimensions) separately from the raw sample
//! stream: creations, deletions, and UUID identity. The parent storage
//! engine uses it to recover a consistent view of which series exist, and
//! to reclaim space for deleted series, without scanning its data files.
//!
//! # Architecture
//!
//! - **Log Writer**: appends lifecycle records to append-only segment
//!   files, each record durable before the call returns
//! - **UUID Index**: in-memory UUID -> dimension map, a derived cache
//!   rebuilt from the log at every startup
//! - **Recovery Engine**: replays segments at init, reconciles against the
//!   live object model, and cuts crash residue off the active tail
//! - **Instance**: one `Metalog` per storage-engine parent, owning the
//!   write path and the lifecycle state machine

pub mod compaction;
pub mod index;
pub mod log;
pub mod recovery;

mod error;
mod instance;
mod types;

#[cfg(test)]
mod testutil;

pub use error::{MetalogError, Result};
pub use instance::Metalog;
pub use types::*;

/// Metalog version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    use std::time::Duration;

    /// Maximum segment size before rotation (4MB)
    pub const SEGMENT_MAX_BYTES: usize = 4 * 1024 * 1024;

    /// Maximum active-segment age before rotation (1 hour)
    pub const SEGMENT_MAX_AGE: Duration = Duration::from_secs(60 * 60);
}
