//! Geometry batching
//!
//! Merges many small pieces of geometry into a few large drawables and keeps
//! their visibility current.
//!
//! # Threads
//!
//! ```text
//! producer thread                          consumer thread
//! GeometryBatcher                          DrawObjectManager<B>
//!   prepare_* ─▶ BatchRouter (open batches)
//!   hide/show/destroy ─▶ GeometryTable ◀─── refresh reads records
//!   flush ─▶ FlushScheduler ─────────────▶ process_pending
//!                                           ├── Materialize ─▶ create_drawable
//!                                           ├── Refresh ─────▶ set_index_ranges
//!                                           └── Notify ──────▶ callback
//! ```
//!
//! Both halves share one [`BatchContext`]; [`session`] builds the pair.

pub mod batch;
pub mod context;
pub mod draw_objects;
pub mod geometry_table;
pub mod handle;
pub mod range;
pub mod router;
pub mod scheduler;
pub mod session;
pub mod slots;

#[cfg(test)]
mod tests;

pub use batch::{BatchKey, GeometryKind, SealedBatch, SizeHint};
pub use context::BatchContext;
pub use draw_objects::DrawObjectManager;
pub use geometry_table::{GeometryId, GeometryState, GeometryTable};
pub use handle::GeometryHandle;
pub use range::{PackedRange, CAPACITY_CEILING};
pub use scheduler::{FlushCallback, FlushScheduler, WorkItem};
pub use session::GeometryBatcher;
pub use slots::RendererSlot;

use crate::config::{BatcherConfig, ConfigError};
use crate::render::{DrawableBackend, RenderError};
use std::sync::Arc;

/// Result type for batching operations
pub type BatchResult<T> = Result<T, BatchError>;

/// Errors surfaced by the consumer side of a batching session
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// The drawable backend rejected an operation
    #[error("Drawable backend error: {0}")]
    Backend(#[from] RenderError),

    /// The session configuration is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A sealed batch arrived for a slot that still has a drawable
    #[error("{slot} already has a drawable")]
    SlotOccupied {
        /// Slot named by the sealed batch
        slot: RendererSlot,
    },
}

/// Counters kept by a [`DrawObjectManager`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Drawables currently alive
    pub drawables: usize,

    /// Sealed batches turned into drawables
    pub batches_materialized: usize,

    /// Slot refreshes executed
    pub refreshes: usize,

    /// Index list updates sent to the backend
    pub index_updates: usize,

    /// Drawables destroyed because all their geometry was destroyed
    pub drawables_torn_down: usize,

    /// Geometry ids returned to the free list
    pub geometry_recycled: usize,
}

impl BatchStats {
    /// Average refreshes per materialized batch
    pub fn avg_refreshes_per_batch(&self) -> f32 {
        if self.batches_materialized == 0 {
            0.0
        } else {
            self.refreshes as f32 / self.batches_materialized as f32
        }
    }
}

/// Outcome of one [`DrawObjectManager::process_pending`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Work items executed
    pub executed: usize,
    /// Work items that returned an error
    pub failed: usize,
    /// Completion callbacks invoked
    pub notified: usize,
}

/// Build the producer and consumer halves of a batching session
pub fn session<B: DrawableBackend>(
    config: BatcherConfig,
    backend: B,
) -> BatchResult<(GeometryBatcher, DrawObjectManager<B>)> {
    let context = Arc::new(BatchContext::new(config)?);
    log::info!(
        "Batching session started (seal threshold {}, {} geometry records reserved)",
        context.config().seal_threshold,
        context.table().capacity()
    );

    Ok((
        GeometryBatcher::new(Arc::clone(&context)),
        DrawObjectManager::new(context, backend),
    ))
}
