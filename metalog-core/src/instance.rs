//! Metalog instance: lifecycle management and the public API surface
//!
//! One instance exists per parent storage engine and is owned by it
//! exclusively. `Metalog::init` runs recovery before the instance becomes
//! visible, so every handle the rest of the system sees is already
//! consistent with the log.

use crate::compaction::{remove_consumed_segments, CompactionReport};
use crate::index::UuidIndex;
use crate::log::{list_segments, LogWriter, MetalogConfig, RecordKind};
use crate::recovery::RecoveryEngine;
use crate::{
    DimensionHandle, EngineContext, InstanceState, MetalogError, MetalogStats, ObjectModel,
    Result,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// The metadata log for one storage-engine parent.
///
/// Mutating operations are serialized through a single per-instance write
/// path: log append and index mutation happen under one lock, in log-first
/// order, so the log is always the ground truth and a crash between the two
/// is repaired by replay. `lookup_dimension` reads concurrently.
pub struct Metalog {
    config: MetalogConfig,
    state: RwLock<InstanceState>,
    /// The write serialization point: one append/commit in flight at a time
    write_lock: Mutex<()>,
    writer: LogWriter,
    index: UuidIndex,
}

impl Metalog {
    /// Create or open the metalog for a parent engine and run recovery.
    ///
    /// Must be called exactly once per parent before any other metalog
    /// operation; concurrent calls for the same parent are the caller's
    /// responsibility to serialize. Fails with `Io` when the log directory
    /// cannot be used and `Corruption` when an existing log is damaged
    /// beyond what recovery may repair.
    ///
    /// The object model is only consulted here, for replay existence checks
    /// and reconciliation; the instance holds no reference to it afterwards.
    pub fn init(ctx: &EngineContext, model: &dyn ObjectModel) -> Result<Self> {
        let config = MetalogConfig {
            dir: ctx.metalog_dir(),
            ..Default::default()
        };
        Self::init_with_config(config, model)
    }

    /// `init` with explicit configuration
    pub fn init_with_config(config: MetalogConfig, model: &dyn ObjectModel) -> Result<Self> {
        config.validate()?;
        let recovery = RecoveryEngine::run(&config, model)?;
        let writer = LogWriter::open(config.clone(), recovery.writer_start)?;

        let instance = Self {
            config,
            state: RwLock::new(InstanceState::Initializing),
            write_lock: Mutex::new(()),
            writer,
            index: recovery.index,
        };

        *instance.state.write() = InstanceState::Active;
        info!(
            dir = %instance.config.dir.display(),
            segments = recovery.segments,
            replayed = recovery.replayed,
            "metalog instance active"
        );
        Ok(instance)
    }

    /// Current lifecycle state
    pub fn state(&self) -> InstanceState {
        *self.state.read()
    }

    /// Durably record that a dimension came into existence and bind it in
    /// the index.
    ///
    /// The record is on stable storage before the index mutation; a crash in
    /// between is repaired by replay. A UUID already live under a different
    /// handle is an unrecoverable upstream bug (`UuidConflict`). Re-creating
    /// an identical live binding appends nothing.
    pub fn commit_dimension_created(
        &self,
        dimension: Uuid,
        chart: Uuid,
        handle: DimensionHandle,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.ensure_active()?;

        if let Some(existing) = self.index.lookup(&dimension) {
            if existing != handle {
                return Err(MetalogError::UuidConflict { uuid: dimension });
            }
            debug!(%dimension, "dimension already live, creation not re-logged");
            return Ok(());
        }

        self.writer
            .append(RecordKind::DimensionCreated, dimension, Some(chart))?;
        self.index.insert(dimension, chart, handle)?;
        Ok(())
    }

    /// Durably record a chart deletion and tombstone every dimension under
    /// it.
    ///
    /// One `ChartDeleted` record stands in for the whole cascade; no
    /// per-dimension records are written. The record is durable before the
    /// index is touched.
    pub fn commit_delete_chart(&self, chart: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.ensure_active()?;

        self.writer.append(RecordKind::ChartDeleted, chart, None)?;
        let tombstoned = self.index.tombstone_chart(&chart);
        debug!(%chart, dimensions = tombstoned.len(), "chart deletion committed");
        Ok(())
    }

    /// Durably record a dimension deletion if the dimension is known.
    ///
    /// Unknown or already-tombstoned UUIDs are an idempotent no-op, not an
    /// error: deletions are requested redundantly during cleanup cascades.
    /// Returns whether a live dimension was deleted by this call.
    pub fn delete_dimension_by_uuid(&self, dimension: Uuid) -> Result<bool> {
        let _guard = self.write_lock.lock();
        self.ensure_active()?;

        let Some(entry) = self.index.entry(&dimension) else {
            debug!(%dimension, "delete of unknown dimension ignored");
            return Ok(false);
        };
        if entry.tombstoned {
            debug!(%dimension, "delete of tombstoned dimension ignored");
            return Ok(false);
        }

        self.writer
            .append(RecordKind::DimensionDeleted, dimension, Some(entry.chart))?;
        self.index.tombstone(&dimension);
        Ok(true)
    }

    /// Look up a live dimension handle.
    ///
    /// Unknown and tombstoned entities both come back as `None`. May run
    /// concurrently with writers; a lookup racing a tombstone has no
    /// ordering guarantee relative to it.
    pub fn lookup_dimension(&self, uuid: &Uuid) -> Option<DimensionHandle> {
        self.index.lookup(uuid)
    }

    /// Remove sealed segments no future recovery needs
    pub fn compact(&self) -> Result<CompactionReport> {
        let _guard = self.write_lock.lock();
        self.ensure_active()?;
        remove_consumed_segments(&self.config, &self.index)
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> Result<MetalogStats> {
        let segments = list_segments(&self.config.dir)?.len();
        Ok(MetalogStats {
            segments,
            live_entries: self.index.live_count(),
            tombstoned_entries: self.index.tombstoned_count(),
            last_sequence: self.writer.last_sequence(),
        })
    }

    /// Flush and close the instance.
    ///
    /// Waits for the in-flight append to finish, syncs the active segment,
    /// and transitions to `Closed`; historical segments are never deleted.
    /// Every later mutating call fails fast with `InstanceClosed`.
    pub fn shutdown(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        {
            let state = self.state.read();
            if *state == InstanceState::Closed {
                return Ok(());
            }
        }
        self.writer.sync()?;
        *self.state.write() = InstanceState::Closed;
        info!(dir = %self.config.dir.display(), "metalog instance closed");
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        match *self.state.read() {
            InstanceState::Active => Ok(()),
            _ => Err(MetalogError::InstanceClosed),
        }
    }
}
