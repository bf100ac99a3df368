//! Draw Object Manager
//!
//! Consumer-side owner of every drawable. Drains the flush queue, turns sealed
//! batches into drawables and rebuilds a slot's visible index lists whenever
//! geometry in it is hidden, shown or destroyed.
//!
//! A refresh recomputes the slot's index lists from scratch: ranges are
//! variable-length and interleaved, so patching individual removals is not
//! possible in general. The cost is bounded by the slot's own geometry count.

use super::batch::SealedBatch;
use super::context::BatchContext;
use super::geometry_table::{GeometryId, GeometryState};
use super::range::PackedRange;
use super::scheduler::WorkItem;
use super::slots::RendererSlot;
use super::{BatchError, BatchResult, BatchStats, DrainReport};
use crate::render::{DrawableBackend, DrawableHandle, SubMesh, Topology};
use std::collections::HashMap;
use std::sync::Arc;

/// Live drawable bound to a renderer slot
#[derive(Debug)]
struct DrawSlot {
    batch: Arc<SealedBatch>,
    owned: Vec<GeometryId>,
    drawable: DrawableHandle,
}

/// Owns the drawables built from sealed batches
///
/// Lives on the consumer thread; call [`process_pending`](Self::process_pending)
/// once per tick.
pub struct DrawObjectManager<B: DrawableBackend> {
    context: Arc<BatchContext>,
    backend: B,
    slots: HashMap<RendererSlot, DrawSlot>,
    stats: BatchStats,
}

impl<B: DrawableBackend> DrawObjectManager<B> {
    /// Create a manager drawing through `backend`
    pub fn new(context: Arc<BatchContext>, backend: B) -> Self {
        Self {
            context,
            backend,
            slots: HashMap::new(),
            stats: BatchStats::default(),
        }
    }

    /// Execute every work item queued so far, in order
    ///
    /// Every taken item runs even if an earlier one fails; failures are logged
    /// and the first one is returned after the pass.
    pub fn process_pending(&mut self) -> BatchResult<DrainReport> {
        let context = Arc::clone(&self.context);
        let mut report = DrainReport::default();
        let mut first_error = None;

        let executed = context.scheduler().drain(|item| {
            log::trace!("Executing {item:?}");
            let result = match item {
                WorkItem::Materialize(batch) => self.materialize(batch),
                WorkItem::Refresh(slot) => self.refresh(slot),
                WorkItem::Notify(callback) => {
                    callback();
                    report.notified += 1;
                    Ok(())
                }
            };

            if let Err(error) = result {
                log::error!("Flush work item failed: {error}");
                report.failed += 1;
                first_error.get_or_insert(error);
            }
        });
        if executed == 0 {
            return Ok(report);
        }
        report.executed = executed;

        log::debug!(
            "Drained {} work items ({} failed), {} drawables live",
            report.executed,
            report.failed,
            self.slots.len()
        );

        first_error.map_or(Ok(report), Err)
    }

    /// Build the drawable for a sealed batch and apply current visibility
    pub fn materialize(&mut self, batch: Arc<SealedBatch>) -> BatchResult<()> {
        let slot = batch.slot();
        if self.slots.contains_key(&slot) {
            return Err(BatchError::SlotOccupied { slot });
        }

        let drawable = self.backend.create_drawable(batch.mesh_data())?;
        log::debug!(
            "Materialized {slot} as {drawable:?}: {} vertices, {} geometries",
            batch.vertex_count(),
            batch.geometry_ids().len()
        );

        let owned = batch.geometry_ids().to_vec();
        self.slots.insert(slot, DrawSlot { batch, owned, drawable });
        self.stats.batches_materialized += 1;

        self.refresh(slot)
    }

    /// Recompute the visible index lists of `slot` from its geometry records
    ///
    /// Destroyed geometry is dropped from the slot and recycled. When no
    /// geometry remains the drawable is destroyed and the slot released.
    ///
    /// A slot whose geometry is all hidden keeps its drawable with no index
    /// lists, so a later `show` has a drawable to refresh.
    pub fn refresh(&mut self, slot: RendererSlot) -> BatchResult<()> {
        let Some(entry) = self.slots.get_mut(&slot) else {
            log::warn!("Skipping refresh of {slot}: no drawable");
            return Ok(());
        };
        self.stats.refreshes += 1;

        let table = self.context.table();
        let mut destroyed = Vec::new();
        let mut visible: Vec<(PackedRange, PackedRange)> = Vec::new();
        {
            let reader = table.reader();
            // Reverse order keeps swap_remove from skipping unvisited ids
            for position in (0..entry.owned.len()).rev() {
                let id = entry.owned[position];
                let record = reader.snapshot(id);
                debug_assert_eq!(record.owner, slot, "{id} is owned by another slot");

                match record.state {
                    GeometryState::Destroyed => {
                        entry.owned.swap_remove(position);
                        destroyed.push(id);
                    }
                    GeometryState::Active => visible.push((record.triangles, record.stems)),
                    GeometryState::Hidden => {}
                    GeometryState::Free => panic!("{id} owned by {slot} was recycled early"),
                }
            }
        }

        // The table reader must be released first: recycling takes the free-list lock.
        table.recycle(&destroyed);
        self.stats.geometry_recycled += destroyed.len();

        if entry.owned.is_empty() {
            let drawable = entry.drawable;
            self.slots.remove(&slot);
            self.context.slots().release(slot);
            self.stats.drawables_torn_down += 1;
            log::debug!("Tore down {slot} ({drawable:?}): no geometry left");
            self.backend.destroy_drawable(drawable)?;
            return Ok(());
        }

        let sub_meshes = Self::build_sub_meshes(
            &entry.batch,
            &visible,
            self.context.config().stem_material,
        );
        let drawable = entry.drawable;
        self.backend.set_index_ranges(drawable, &sub_meshes)?;
        self.stats.index_updates += 1;
        Ok(())
    }

    fn build_sub_meshes(
        batch: &SealedBatch,
        visible: &[(PackedRange, PackedRange)],
        stem_material: crate::render::MaterialKey,
    ) -> Vec<SubMesh> {
        let triangle_count = batch.triangle_count();
        let stem_count = batch.stem_count();

        let mut triangle_indices = Vec::new();
        let mut stem_indices = Vec::new();
        // `visible` was collected back to front
        for (triangles, stems) in visible.iter().rev() {
            triangle_indices.extend_from_slice(batch.triangle_indices(triangles.resolve(triangle_count)));
            stem_indices.extend_from_slice(batch.stem_indices(stems.resolve(stem_count)));
        }

        let mut sub_meshes = Vec::with_capacity(2);
        if !triangle_indices.is_empty() {
            sub_meshes.push(SubMesh {
                topology: Topology::Triangles,
                indices: triangle_indices,
                material: batch.key().material,
            });
        }
        if !stem_indices.is_empty() {
            sub_meshes.push(SubMesh {
                topology: Topology::Lines,
                indices: stem_indices,
                material: stem_material,
            });
        }
        sub_meshes
    }

    /// Drawable currently bound to `slot`
    pub fn drawable(&self, slot: RendererSlot) -> Option<DrawableHandle> {
        self.slots.get(&slot).map(|entry| entry.drawable)
    }

    /// Geometry still owned by `slot` (visible, hidden or not yet reclaimed)
    pub fn owned_geometry(&self, slot: RendererSlot) -> Option<&[GeometryId]> {
        self.slots.get(&slot).map(|entry| entry.owned.as_slice())
    }

    /// Number of live drawables
    pub fn drawable_count(&self) -> usize {
        self.slots.len()
    }

    /// Counters accumulated since creation
    pub fn stats(&self) -> BatchStats {
        BatchStats {
            drawables: self.slots.len(),
            ..self.stats.clone()
        }
    }

    /// Shared batching context
    pub const fn context(&self) -> &Arc<BatchContext> {
        &self.context
    }

    /// Backend the drawables live in
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::batch::{Batch, BatchKey};
    use crate::config::BatcherConfig;
    use crate::foundation::math::Vec3;
    use crate::render::{MaterialKey, RecordingBackend};

    fn manager() -> DrawObjectManager<RecordingBackend> {
        let context = Arc::new(BatchContext::new(BatcherConfig::default()).expect("valid config"));
        DrawObjectManager::new(context, RecordingBackend::new())
    }

    /// Seal a plain batch holding `count` single-triangle geometries with one stem each
    fn sealed_batch(context: &BatchContext, count: u32) -> (Arc<SealedBatch>, Vec<GeometryId>) {
        let slot = context.slots().acquire();
        let mut batch = Batch::new(slot, BatchKey::plain(MaterialKey(5)));
        let mut ids = Vec::new();
        for _ in 0..count {
            ids.push(batch.begin_geometry(context.table()));
            let base = batch.vertex_count();
            for x in 0..3 {
                batch.positions.push(Vec3::new(x as f32, 0.0, 0.0));
                if let Some(normals) = batch.normals.as_mut() {
                    normals.push(Vec3::z());
                }
            }
            batch.triangles.extend([base, base + 1, base + 2]);
            batch.stems.extend([base, base + 2]);
        }
        (Arc::new(batch.seal()), ids)
    }

    #[test]
    fn test_materialize_publishes_both_sub_meshes() {
        let mut manager = manager();
        let (batch, _) = sealed_batch(manager.context(), 2);
        let slot = batch.slot();
        manager.materialize(batch).expect("materialize");

        let handle = manager.drawable(slot).expect("drawable bound");
        let drawable = manager.backend().get(handle).expect("recorded");
        assert_eq!(drawable.triangle_indices(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(drawable.stem_indices(), &[0, 2, 3, 5]);
        assert_eq!(drawable.sub_mesh(Topology::Triangles).map(|s| s.material), Some(MaterialKey(5)));
        assert_eq!(drawable.sub_mesh(Topology::Lines).map(|s| s.material), Some(MaterialKey(0)));
    }

    #[test]
    fn test_refresh_drops_hidden_and_recycles_destroyed() {
        let mut manager = manager();
        let (batch, ids) = sealed_batch(manager.context(), 3);
        let slot = batch.slot();
        manager.materialize(batch).expect("materialize");

        let table = manager.context().table();
        table.hide(ids[0]);
        table.destroy(ids[1]);
        manager.refresh(slot).expect("refresh");

        assert_eq!(manager.context().table().state(ids[1]), GeometryState::Free);
        assert_eq!(manager.owned_geometry(slot).map(<[GeometryId]>::len), Some(2));
        let handle = manager.drawable(slot).expect("drawable bound");
        let drawable = manager.backend().get(handle).expect("recorded");
        assert_eq!(drawable.triangle_indices(), &[6, 7, 8]);
        assert_eq!(manager.stats().geometry_recycled, 1);
    }

    #[test]
    fn test_hiding_everything_keeps_the_drawable() {
        let mut manager = manager();
        let (batch, ids) = sealed_batch(manager.context(), 1);
        let slot = batch.slot();
        manager.materialize(batch).expect("materialize");

        manager.context().table().hide(ids[0]);
        manager.refresh(slot).expect("refresh");

        let handle = manager.drawable(slot).expect("drawable kept while geometry is hidden");
        assert!(manager.backend().get(handle).expect("recorded").sub_meshes.is_empty());
    }

    #[test]
    fn test_last_destroy_tears_down_and_releases_slot() {
        let mut manager = manager();
        let (batch, ids) = sealed_batch(manager.context(), 1);
        let slot = batch.slot();
        manager.materialize(batch).expect("materialize");
        assert_eq!(manager.context().slots().live_count(), 1);

        manager.context().table().destroy(ids[0]);
        manager.refresh(slot).expect("refresh");

        assert_eq!(manager.drawable_count(), 0);
        assert_eq!(manager.backend().drawable_count(), 0);
        assert_eq!(manager.context().slots().live_count(), 0);
        assert_eq!(manager.stats().drawables_torn_down, 1);
    }

    #[test]
    fn test_work_queued_during_a_pass_waits_for_the_next() {
        let mut manager = manager();
        let context = Arc::clone(manager.context());
        manager
            .context()
            .scheduler()
            .enqueue(WorkItem::Notify(Box::new(move || {
                context.scheduler().enqueue(WorkItem::Refresh(RendererSlot(3)));
            })));

        let report = manager.process_pending().expect("drain succeeds");
        assert_eq!((report.executed, report.notified), (1, 1));
        assert_eq!(manager.context().scheduler().pending_len(), 1);

        let report = manager.process_pending().expect("drain succeeds");
        assert_eq!(report.executed, 1);
        assert!(manager.context().scheduler().is_empty());
    }

    #[test]
    fn test_refresh_of_unknown_slot_is_a_no_op() {
        let mut manager = manager();
        manager.refresh(RendererSlot(42)).expect("no-op");
        assert_eq!(manager.stats().refreshes, 0);
    }

    #[test]
    fn test_materializing_an_occupied_slot_fails() {
        let mut manager = manager();
        let (batch, _) = sealed_batch(manager.context(), 1);
        manager.materialize(Arc::clone(&batch)).expect("first materialize");
        assert!(matches!(
            manager.materialize(batch),
            Err(BatchError::SlotOccupied { .. })
        ));
    }
}
