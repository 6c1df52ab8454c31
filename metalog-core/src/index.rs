//! UUID index mapping entity identity to live dimension handles
//!
//! The index is a derived cache: it is never persisted and is rebuilt from
//! the log plus the live object model at every startup. Handles stored here
//! are weak references into the host's object model; the index never frees
//! or dereferences them.

use crate::{DimensionHandle, MetalogError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::error;
use uuid::Uuid;

/// One index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Handle into the object model
    pub handle: DimensionHandle,
    /// Owning chart
    pub chart: Uuid,
    /// Logically deleted
    pub tombstoned: bool,
}

/// UUID → dimension index for one metalog instance.
///
/// Reads proceed concurrently with a writer; a `lookup` racing a
/// `tombstone` has no ordering guarantee relative to that tombstone.
#[derive(Debug, Default)]
pub struct UuidIndex {
    entries: RwLock<HashMap<Uuid, IndexEntry>>,
}

impl UuidIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live dimension handle.
    ///
    /// Returns `None` for unknown and tombstoned entities alike; once
    /// tombstoned, a dimension is logically gone.
    pub fn lookup(&self, uuid: &Uuid) -> Option<DimensionHandle> {
        let entries = self.entries.read();
        entries
            .get(uuid)
            .filter(|e| !e.tombstoned)
            .map(|e| e.handle)
    }

    /// Bind a UUID to a live dimension handle.
    ///
    /// Re-inserting the identical binding is accepted (replay meeting
    /// reconciliation). A UUID already bound to a *different* live handle is
    /// an unrecoverable internal-invariant violation: it means upstream UUID
    /// assignment is broken, so the inconsistency is logged and surfaced
    /// rather than silently overwritten. Inserting over a tombstone revives
    /// the entry under the new handle.
    pub fn insert(&self, uuid: Uuid, chart: Uuid, handle: DimensionHandle) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&uuid) {
            if !existing.tombstoned && existing.handle != handle {
                error!(
                    %uuid,
                    existing = %existing.handle,
                    incoming = %handle,
                    "two live dimensions share a UUID"
                );
                return Err(MetalogError::UuidConflict { uuid });
            }
        }
        entries.insert(
            uuid,
            IndexEntry {
                handle,
                chart,
                tombstoned: false,
            },
        );
        Ok(())
    }

    /// Tombstone an entry. Idempotent: unknown or already-tombstoned UUIDs
    /// are a no-op. Returns whether a live entry was tombstoned.
    pub fn tombstone(&self, uuid: &Uuid) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(uuid) {
            Some(entry) if !entry.tombstoned => {
                entry.tombstoned = true;
                true
            }
            _ => false,
        }
    }

    /// Tombstone every live entry under a chart; returns the affected UUIDs
    pub fn tombstone_chart(&self, chart: &Uuid) -> Vec<Uuid> {
        let mut entries = self.entries.write();
        let mut affected = Vec::new();
        for (uuid, entry) in entries.iter_mut() {
            if entry.chart == *chart && !entry.tombstoned {
                entry.tombstoned = true;
                affected.push(*uuid);
            }
        }
        affected
    }

    /// Full entry for a UUID, tombstoned or not
    pub fn entry(&self, uuid: &Uuid) -> Option<IndexEntry> {
        self.entries.read().get(uuid).copied()
    }

    /// Whether the UUID is present and tombstoned
    pub fn is_tombstoned(&self, uuid: &Uuid) -> bool {
        self.entries
            .read()
            .get(uuid)
            .map(|e| e.tombstoned)
            .unwrap_or(false)
    }

    /// Whether the UUID is present at all, tombstoned or not
    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.entries.read().contains_key(uuid)
    }

    /// Number of live entries
    pub fn live_count(&self) -> usize {
        self.entries.read().values().filter(|e| !e.tombstoned).count()
    }

    /// Number of tombstoned entries
    pub fn tombstoned_count(&self) -> usize {
        self.entries.read().values().filter(|e| e.tombstoned).count()
    }
}
