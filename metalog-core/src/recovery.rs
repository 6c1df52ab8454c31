//! Startup recovery
//!
//! Runs once, single-threaded, before the instance is exposed: scans
//! segments, cuts crash residue off the active tail, replays records into a
//! fresh UUID index, and reconciles the result against the live object
//! model. The log is the ground truth; the index is rebuilt from scratch on
//! every startup.

use crate::index::UuidIndex;
use crate::log::{LogReader, MetalogConfig, RecordKind, ScanOutcome, WriterStart};
use crate::{ObjectModel, Result};
use std::fs::OpenOptions;
use tracing::{debug, info};

/// Result of a completed recovery run
pub struct RecoveryOutcome {
    /// The rebuilt index
    pub index: UuidIndex,
    /// Where the writer picks up
    pub writer_start: WriterStart,
    /// Number of segments on disk
    pub segments: usize,
    /// Number of records replayed
    pub replayed: usize,
    /// Number of dimensions back-filled from the object model
    pub backfilled: usize,
}

/// Rebuilds in-memory state from the log at startup
pub struct RecoveryEngine;

impl RecoveryEngine {
    /// Scan, truncate crash residue, replay, and reconcile.
    ///
    /// Fails with `Corruption` when the log is damaged beyond the active
    /// tail; the instance must not come up on a possibly-wrong state.
    pub fn run(config: &MetalogConfig, model: &dyn ObjectModel) -> Result<RecoveryOutcome> {
        let scan = LogReader::new(config.clone()).scan()?;
        Self::truncate_residue(&scan)?;

        let index = UuidIndex::new();
        let mut replayed = 0;

        for segment in &scan.segments {
            for record in &segment.records {
                replayed += 1;
                match record.kind {
                    RecordKind::DimensionCreated => {
                        // Resolve through the model: the handle stored in the
                        // index must be the one the model owns today
                        match model.dimension(&record.entity_uuid) {
                            Some(live) => index.insert(live.uuid, live.chart, live.handle)?,
                            None => {
                                // The entity was later fully purged
                                debug!(
                                    uuid = %record.entity_uuid,
                                    sequence = record.sequence,
                                    "skipping stale creation record"
                                );
                            }
                        }
                    }
                    RecordKind::DimensionDeleted => {
                        index.tombstone(&record.entity_uuid);
                    }
                    RecordKind::ChartDeleted => {
                        index.tombstone_chart(&record.entity_uuid);
                    }
                }
            }
        }

        // Reconcile: a dimension the engine already holds data for must
        // never be lost, even if its creation record is missing
        let mut backfilled = 0;
        for live in model.live_dimensions() {
            if !index.contains(&live.uuid) {
                index.insert(live.uuid, live.chart, live.handle)?;
                backfilled += 1;
                debug!(uuid = %live.uuid, "back-filled dimension with no creation record");
            }
        }

        info!(
            segments = scan.segments.len(),
            replayed,
            backfilled,
            live = index.live_count(),
            tombstoned = index.tombstoned_count(),
            "metalog recovery complete"
        );

        Ok(RecoveryOutcome {
            index,
            writer_start: scan.writer_start,
            segments: scan.segments.len(),
            replayed,
            backfilled,
        })
    }

    /// Physically cut crash residue off the active tail so the writer can
    /// append at a clean record boundary
    fn truncate_residue(scan: &ScanOutcome) -> Result<()> {
        for segment in &scan.segments {
            if !segment.truncated_tail {
                continue;
            }
            let file = OpenOptions::new().write(true).open(&segment.info.path)?;
            file.set_len(segment.valid_len)?;
            file.sync_all()?;
            info!(
                segment = segment.info.id,
                valid_len = segment.valid_len,
                "truncated crash residue"
            );
        }
        Ok(())
    }
}
