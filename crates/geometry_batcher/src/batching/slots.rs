//! Renderer slot allocation
//!
//! Each batch owns one renderer slot from the moment it is opened until the
//! drawable built from it no longer holds live geometry.

use crate::foundation::collections::IndexPool;
use crate::foundation::sync::lock;
use std::fmt;
use std::sync::Mutex;

/// Recyclable identifier of one drawable's backing storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RendererSlot(pub u32);

impl fmt::Display for RendererSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Thread-safe free list of renderer slots
///
/// Guarded by its own lock, independent of the geometry table.
#[derive(Debug, Default)]
pub struct SlotAllocator {
    pool: Mutex<IndexPool>,
}

impl SlotAllocator {
    /// Create an allocator with no slots handed out
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a free slot
    pub fn acquire(&self) -> RendererSlot {
        RendererSlot(lock(&self.pool).acquire())
    }

    /// Return a slot whose drawable has been torn down
    pub fn release(&self, slot: RendererSlot) {
        lock(&self.pool).release(slot.0);
    }

    /// Number of slots currently handed out
    pub fn live_count(&self) -> usize {
        lock(&self.pool).live_count()
    }
}
