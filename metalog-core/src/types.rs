//! Core types for the metalog

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Opaque identifier for a dimension object owned by the host engine's
/// object model. The metalog stores and returns handles but never resolves,
/// frees, or dereferences them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionHandle(pub u64);

impl fmt::Display for DimensionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dim#{}", self.0)
    }
}

/// A dimension as seen by the host engine's live object model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveDimension {
    /// Dimension identity
    pub uuid: Uuid,
    /// Owning chart identity
    pub chart: Uuid,
    /// Handle into the object model
    pub handle: DimensionHandle,
}

/// View of the host engine's chart/dimension object model.
///
/// The metalog consults the model during recovery (existence checks for
/// replayed records, enumeration for reconciliation) and never mutates it.
pub trait ObjectModel: Send + Sync {
    /// Look up a dimension by UUID; `None` once the engine has purged it
    fn dimension(&self, uuid: &Uuid) -> Option<LiveDimension>;

    /// Enumerate every dimension the engine currently holds data for
    fn live_dimensions(&self) -> Vec<LiveDimension>;
}

/// Handle supplied by the parent storage engine at init time. One metalog
/// instance exists per parent; the parent owns it exclusively.
#[derive(Debug, Clone)]
pub struct EngineContext {
    /// Base data directory of the parent instance; the metalog keeps its
    /// segments in a subdirectory of this
    pub data_dir: PathBuf,
}

impl EngineContext {
    /// Create a context rooted at the given data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Directory holding this parent's metalog segments
    pub fn metalog_dir(&self) -> PathBuf {
        self.data_dir.join("metalog")
    }
}

/// Lifecycle state of a metalog instance.
///
/// There is no `Uninitialized` variant: an instance only exists once
/// `Metalog::init` has run recovery and opened the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    /// Recovery is running; the instance is not yet visible to callers
    Initializing,
    /// Open for reads and durable writes
    Active,
    /// Shut down; all further operations fail fast
    Closed,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Initializing => "initializing",
            InstanceState::Active => "active",
            InstanceState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Point-in-time statistics for a metalog instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetalogStats {
    /// Number of segment files on disk, the active one included
    pub segments: usize,
    /// Index entries that are live (not tombstoned)
    pub live_entries: usize,
    /// Index entries that are tombstoned
    pub tombstoned_entries: usize,
    /// Sequence number of the most recently appended record, 0 if none
    pub last_sequence: u64,
}
