//! Shared batching context
//!
//! The registries touched by both the producer session and the consumer
//! manager, each guarded by its own lock.

use super::geometry_table::GeometryTable;
use super::scheduler::FlushScheduler;
use super::slots::SlotAllocator;
use crate::config::{BatcherConfig, ConfigError};

/// State shared between one [`GeometryBatcher`](super::GeometryBatcher) and
/// its [`DrawObjectManager`](super::DrawObjectManager)
#[derive(Debug)]
pub struct BatchContext {
    config: BatcherConfig,
    table: GeometryTable,
    slots: SlotAllocator,
    scheduler: FlushScheduler,
}

impl BatchContext {
    /// Validate `config` and build empty registries
    pub fn new(config: BatcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let table = GeometryTable::with_capacity(config.initial_geometry_capacity);

        Ok(Self {
            config,
            table,
            slots: SlotAllocator::new(),
            scheduler: FlushScheduler::new(),
        })
    }

    /// Configuration the context was built with
    pub const fn config(&self) -> &BatcherConfig {
        &self.config
    }

    /// Geometry records
    pub const fn table(&self) -> &GeometryTable {
        &self.table
    }

    /// Renderer slot free list
    pub const fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    /// Pending consumer work
    pub const fn scheduler(&self) -> &FlushScheduler {
        &self.scheduler
    }
}
