//! Producer session
//!
//! [`GeometryBatcher`] is the producer-facing API: prepare geometry, change its
//! visibility, and flush. Nothing becomes visible to the consumer until a
//! flush hands the sealed batches and dirty slots to the scheduler.

use super::batch::{BatchKey, SealedBatch, SizeHint};
use super::context::BatchContext;
use super::geometry_table::{GeometryId, GeometryState};
use super::handle::GeometryHandle;
use super::router::BatchRouter;
use super::scheduler::{FlushCallback, WorkItem};
use super::slots::RendererSlot;
use crate::render::MaterialKey;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Producer side of a batching session
///
/// Owned by one thread at a time; the methods take `&mut self` so the open
/// batches never need a lock.
#[derive(Debug)]
pub struct GeometryBatcher {
    context: Arc<BatchContext>,
    router: BatchRouter,
    dirty_slots: BTreeSet<RendererSlot>,
    flush_count: u64,
}

impl GeometryBatcher {
    /// Create a producer over `context`
    pub fn new(context: Arc<BatchContext>) -> Self {
        let router = BatchRouter::new(context.config().seal_threshold);
        Self {
            context,
            router,
            dirty_slots: BTreeSet::new(),
            flush_count: 0,
        }
    }

    /// Start a geometry with positions and normals drawn with `material`
    pub fn prepare_plain(&mut self, material: MaterialKey) -> GeometryHandle<'_> {
        self.prepare_with_hint(BatchKey::plain(material), SizeHint::default())
    }

    /// Start a geometry with positions, normals and texture coordinates
    pub fn prepare_textured(&mut self, material: MaterialKey) -> GeometryHandle<'_> {
        self.prepare_with_hint(BatchKey::textured(material), SizeHint::default())
    }

    /// Start a position-only geometry made of stems
    pub fn prepare_stems_only(&mut self) -> GeometryHandle<'_> {
        let key = BatchKey::stems_only(self.context.config().stem_material);
        self.prepare_with_hint(key, SizeHint::default())
    }

    /// Start a geometry for `key`, sealing the open batch first if `hint` more
    /// data would not fit under the capacity ceiling
    pub fn prepare_with_hint(&mut self, key: BatchKey, hint: SizeHint) -> GeometryHandle<'_> {
        self.router
            .prepare(key, hint, self.context.table(), self.context.slots())
    }

    /// Exclude a geometry from drawing after the next flush
    ///
    /// # Panics
    ///
    /// Panics if `id` was destroyed or never allocated.
    pub fn hide(&mut self, id: GeometryId) {
        let changed = self.context.table().hide(id);
        self.mark_dirty(changed);
    }

    /// Draw a hidden geometry again after the next flush
    ///
    /// # Panics
    ///
    /// Panics if `id` was destroyed or never allocated.
    pub fn show(&mut self, id: GeometryId) {
        let changed = self.context.table().show(id);
        self.mark_dirty(changed);
    }

    /// Release a geometry; its id is reclaimed by the next refresh of its slot
    ///
    /// Destroying an id twice is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never allocated.
    pub fn destroy(&mut self, id: GeometryId) {
        let changed = self.context.table().destroy(id);
        self.mark_dirty(changed);
    }

    fn mark_dirty(&mut self, changed: Option<RendererSlot>) {
        if let Some(slot) = changed {
            self.dirty_slots.insert(slot);
        }
    }

    /// Current state of a geometry
    pub fn geometry_state(&self, id: GeometryId) -> GeometryState {
        self.context.table().state(id)
    }

    /// Publish everything prepared or changed since the last flush
    pub fn flush(&mut self) {
        self.flush_inner(None);
    }

    /// Publish like [`flush`](Self::flush) and run `on_ready` on the consumer
    /// thread once everything published here has been applied
    pub fn flush_with(&mut self, on_ready: impl FnOnce() + Send + 'static) {
        self.flush_inner(Some(Box::new(on_ready)));
    }

    fn flush_inner(&mut self, on_ready: Option<FlushCallback>) {
        let sealed = self.router.seal_all(self.context.table(), self.context.slots());
        let mut dirty = std::mem::take(&mut self.dirty_slots);
        // Materializing a batch already applies current visibility
        for batch in &sealed {
            dirty.remove(&batch.slot());
        }
        self.flush_count += 1;

        if sealed.is_empty() && dirty.is_empty() && on_ready.is_none() {
            return;
        }
        log::info!(
            "Flush #{}: {} sealed batches, {} dirty slots",
            self.flush_count,
            sealed.len(),
            dirty.len()
        );

        let items = sealed
            .into_iter()
            .map(|batch: SealedBatch| WorkItem::Materialize(Arc::new(batch)))
            .chain(dirty.into_iter().map(WorkItem::Refresh))
            .chain(on_ready.map(WorkItem::Notify));
        self.context.scheduler().enqueue_all(items);
    }

    /// Number of batches still accepting geometry
    pub fn open_batch_count(&self) -> usize {
        self.router.open_batch_count()
    }

    /// Number of batches sealed for capacity, waiting for the next flush
    pub fn pending_sealed_count(&self) -> usize {
        self.router.pending_sealed_count()
    }

    /// Number of flushes issued so far
    pub const fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// Shared batching context
    pub const fn context(&self) -> &Arc<BatchContext> {
        &self.context
    }
}
