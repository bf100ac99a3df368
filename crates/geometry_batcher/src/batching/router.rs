//! Batch routing
//!
//! Keeps at most one open batch per [`BatchKey`] and decides when an open
//! batch is full. Batches sealed for capacity wait here until the next flush
//! hands them to the scheduler.
//!
//! A geometry written without a size hint may carry its batch past
//! [`CAPACITY_CEILING`](super::range::CAPACITY_CEILING). Such a batch is split
//! before sealing, moving that last geometry into a batch of its own.

use super::batch::{Batch, BatchKey, SealedBatch, SizeHint};
use super::geometry_table::GeometryTable;
use super::handle::GeometryHandle;
use super::slots::{RendererSlot, SlotAllocator};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Chooses the open batch each new geometry is appended to
#[derive(Debug)]
pub struct BatchRouter {
    open: BTreeMap<BatchKey, Batch>,
    sealed: Vec<SealedBatch>,
    seal_threshold: u32,
}

impl BatchRouter {
    /// Create a router sealing batches at `seal_threshold`
    pub fn new(seal_threshold: u32) -> Self {
        Self {
            open: BTreeMap::new(),
            sealed: Vec::new(),
            seal_threshold,
        }
    }

    /// Allocate a geometry in the open batch for `key`
    ///
    /// The open batch is sealed first when it is over the threshold or when
    /// `hint` more data would pass the ceiling; a fresh batch (and renderer
    /// slot) is opened in its place.
    pub fn prepare(
        &mut self,
        key: BatchKey,
        hint: SizeHint,
        table: &GeometryTable,
        slots: &SlotAllocator,
    ) -> GeometryHandle<'_> {
        if let Entry::Occupied(entry) = self.open.entry(key) {
            let full = entry.get().is_over_threshold(self.seal_threshold)
                || entry.get().would_exceed_ceiling(hint);
            if full {
                let batch = entry.remove();
                log::debug!("{} is full, sealing it early", batch.slot());
                self.retire(batch, table, slots);
            }
        }

        let batch = self.open.entry(key).or_insert_with(|| {
            let slot = slots.acquire();
            log::debug!("Opened {slot} for {key:?}");
            Batch::new(slot, key)
        });

        let id = batch.begin_geometry(table);
        GeometryHandle::new(id, batch)
    }

    /// Seal every open batch and hand over all sealed batches, oldest first
    pub fn seal_all(&mut self, table: &GeometryTable, slots: &SlotAllocator) -> Vec<SealedBatch> {
        let open = std::mem::take(&mut self.open);
        for batch in open.into_values() {
            self.retire(batch, table, slots);
        }
        std::mem::take(&mut self.sealed)
    }

    /// Seal `batch`, first splitting off its last geometry if it went past the ceiling
    ///
    /// # Panics
    ///
    /// Panics when a single geometry exceeds the ceiling on its own.
    fn retire(&mut self, mut batch: Batch, table: &GeometryTable, slots: &SlotAllocator) {
        if batch.exceeds_ceiling() && batch.geometry_ids().len() > 1 {
            let tail = batch.split_off_last(slots.acquire(), table);
            self.sealed.push(batch.seal());
            self.sealed.push(tail.seal());
        } else {
            self.sealed.push(batch.seal());
        }
    }

    /// Number of batches still accepting geometry
    pub fn open_batch_count(&self) -> usize {
        self.open.len()
    }

    /// Number of batches sealed for capacity and waiting for a flush
    pub fn pending_sealed_count(&self) -> usize {
        self.sealed.len()
    }

    /// Slot of the open batch for `key`, if there is one
    pub fn open_slot(&self, key: BatchKey) -> Option<RendererSlot> {
        self.open.get(&key).map(Batch::slot)
    }
}
