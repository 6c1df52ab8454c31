//! Test support: an in-memory object model

use crate::{DimensionHandle, LiveDimension, ObjectModel};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory chart/dimension object model standing in for the host engine
#[derive(Default)]
pub(crate) struct TestModel {
    dimensions: RwLock<HashMap<Uuid, LiveDimension>>,
}

impl TestModel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, uuid: Uuid, chart: Uuid, handle: DimensionHandle) {
        self.dimensions.write().insert(
            uuid,
            LiveDimension {
                uuid,
                chart,
                handle,
            },
        );
    }

    /// Fully purge a dimension, as the engine does after reclaiming space
    pub(crate) fn purge(&self, uuid: &Uuid) {
        self.dimensions.write().remove(uuid);
    }
}

impl ObjectModel for TestModel {
    fn dimension(&self, uuid: &Uuid) -> Option<LiveDimension> {
        self.dimensions.read().get(uuid).copied()
    }

    fn live_dimensions(&self) -> Vec<LiveDimension> {
        self.dimensions.read().values().copied().collect()
    }
}
