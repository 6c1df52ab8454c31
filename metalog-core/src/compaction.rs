//! Lazy segment compaction
//!
//! A sealed segment whose created dimensions are all tombstoned (or fully
//! purged) contributes nothing to any future recovery and can be removed.
//! Removal is restricted to a prefix of the sealed segments so the
//! surviving records keep dense sequence numbers across segment boundaries,
//! which recovery enforces. The active segment is never touched.

use crate::index::UuidIndex;
use crate::log::{LogReader, MetalogConfig, RecordKind};
use crate::Result;
use std::fs;
use tracing::{info, warn};

/// Outcome of one compaction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Sealed segments examined
    pub examined: usize,
    /// Segments removed
    pub removed: usize,
}

/// Remove sealed segments no future recovery needs.
///
/// Must not race the writer; the caller holds the instance's write
/// serialization point.
pub fn remove_consumed_segments(
    config: &MetalogConfig,
    index: &UuidIndex,
) -> Result<CompactionReport> {
    let scan = LogReader::new(config.clone()).scan()?;
    let mut report = CompactionReport::default();

    if scan.segments.len() <= 1 {
        return Ok(report);
    }

    // Oldest first, newest excluded: the active segment carries the write
    // cursor and the latest sequence
    for segment in &scan.segments[..scan.segments.len() - 1] {
        report.examined += 1;

        let consumed = segment
            .records
            .iter()
            .filter(|r| r.kind == RecordKind::DimensionCreated)
            .all(|r| !index.contains(&r.entity_uuid) || index.is_tombstoned(&r.entity_uuid));

        if !consumed {
            // Stop at the first segment still holding live creations so the
            // surviving prefix stays contiguous
            break;
        }

        match fs::remove_file(&segment.info.path) {
            Ok(()) => {
                report.removed += 1;
                info!(
                    segment = segment.info.id,
                    records = segment.records.len(),
                    "removed fully tombstoned segment"
                );
            }
            Err(e) => {
                warn!(segment = segment.info.id, error = %e, "failed to remove segment");
                break;
            }
        }
    }

    Ok(report)
}
