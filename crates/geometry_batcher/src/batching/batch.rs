//! Batches of geometry sharing one renderer slot
//!
//! A [`Batch`] accumulates vertex and index data from many producer calls.
//! Sealing it validates the caller contract and freezes the data into a
//! [`SealedBatch`], which is immutable and shared with the consumer thread.

use super::geometry_table::{GeometryId, GeometryTable};
use super::range::{PackedRange, CAPACITY_CEILING};
use super::slots::RendererSlot;
use crate::foundation::math::{Vec2, Vec3};
use crate::render::{MaterialKey, MeshData};
use std::ops::Range;

/// Vertex layout and primitive set of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeometryKind {
    /// Positions and normals; triangles and stems
    Plain,
    /// Positions, normals and texture coordinates; triangles and stems
    Textured,
    /// Positions only; stems only
    StemsOnly,
}

impl GeometryKind {
    /// Whether batches of this kind track per-vertex normals
    pub const fn has_normals(self) -> bool {
        !matches!(self, Self::StemsOnly)
    }

    /// Whether batches of this kind track texture coordinates
    pub const fn has_uvs(self) -> bool {
        matches!(self, Self::Textured)
    }

    /// Whether batches of this kind accept triangles
    pub const fn has_triangles(self) -> bool {
        !matches!(self, Self::StemsOnly)
    }
}

/// Sharing criterion of a batch: geometry with equal keys may share one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchKey {
    /// Face material of the batch's triangles
    pub material: MaterialKey,
    /// Vertex layout and primitive set
    pub kind: GeometryKind,
}

impl BatchKey {
    /// Key for plain (position + normal) geometry
    pub const fn plain(material: MaterialKey) -> Self {
        Self { material, kind: GeometryKind::Plain }
    }

    /// Key for textured geometry
    pub const fn textured(material: MaterialKey) -> Self {
        Self { material, kind: GeometryKind::Textured }
    }

    /// Key for stems-only geometry
    pub const fn stems_only(material: MaterialKey) -> Self {
        Self { material, kind: GeometryKind::StemsOnly }
    }
}

/// Upper bound on what one geometry is about to append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeHint {
    /// Vertices
    pub vertices: u32,
    /// Triangles (not indices)
    pub triangles: u32,
    /// Stems (not indices)
    pub stems: u32,
}

/// Open batch accepting geometry
#[derive(Debug)]
pub struct Batch {
    slot: RendererSlot,
    key: BatchKey,
    pub(super) positions: Vec<Vec3>,
    pub(super) normals: Option<Vec<Vec3>>,
    pub(super) uvs: Option<Vec<Vec2>>,
    pub(super) triangles: Vec<u32>,
    pub(super) stems: Vec<u32>,
    geometry: Vec<GeometryId>,
    /// First vertex of each geometry, parallel to `geometry`
    vertex_starts: Vec<u32>,
}

impl Batch {
    /// Open an empty batch bound to `slot`
    pub fn new(slot: RendererSlot, key: BatchKey) -> Self {
        Self {
            slot,
            key,
            positions: Vec::new(),
            normals: key.kind.has_normals().then(Vec::new),
            uvs: key.kind.has_uvs().then(Vec::new),
            triangles: Vec::new(),
            stems: Vec::new(),
            geometry: Vec::new(),
            vertex_starts: Vec::new(),
        }
    }

    /// Renderer slot the batch will be drawn through
    pub const fn slot(&self) -> RendererSlot {
        self.slot
    }

    /// Sharing key
    pub const fn key(&self) -> BatchKey {
        self.key
    }

    /// Vertices appended so far
    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    /// Complete triangles appended so far
    pub fn triangle_count(&self) -> u32 {
        (self.triangles.len() / 3) as u32
    }

    /// Complete stems appended so far
    pub fn stem_count(&self) -> u32 {
        (self.stems.len() / 2) as u32
    }

    /// Geometry allocated in this batch, in append order
    pub fn geometry_ids(&self) -> &[GeometryId] {
        &self.geometry
    }

    /// Whether any count has reached the soft seal threshold
    pub fn is_over_threshold(&self, threshold: u32) -> bool {
        let threshold = threshold as usize;
        self.positions.len() >= threshold
            || self.triangles.len() >= threshold
            || self.stems.len() >= threshold
    }

    /// Whether any count is already past the hard ceiling
    pub fn exceeds_ceiling(&self) -> bool {
        let ceiling = CAPACITY_CEILING as usize;
        self.positions.len() > ceiling || self.triangles.len() > ceiling || self.stems.len() > ceiling
    }

    /// Whether appending `hint` more data would pass the hard ceiling
    pub fn would_exceed_ceiling(&self, hint: SizeHint) -> bool {
        let ceiling = u64::from(CAPACITY_CEILING);
        self.positions.len() as u64 + u64::from(hint.vertices) > ceiling
            || self.triangles.len() as u64 + 3 * u64::from(hint.triangles) > ceiling
            || self.stems.len() as u64 + 2 * u64::from(hint.stems) > ceiling
    }

    /// Allocate a geometry id whose data starts at the current end of the batch
    ///
    /// Closes the ranges of the previous geometry; the new geometry keeps an
    /// open "through the end" stop until another geometry follows it.
    pub fn begin_geometry(&mut self, table: &GeometryTable) -> GeometryId {
        self.assert_consistent();

        let triangle_count = self.triangle_count();
        let stem_count = self.stem_count();
        if let Some(&previous) = self.geometry.last() {
            let snapshot = table.snapshot(previous);
            table.set_ranges(
                previous,
                snapshot.triangles.close_at(triangle_count),
                snapshot.stems.close_at(stem_count),
            );
        }

        let id = table.allocate(
            self.slot,
            PackedRange::open(triangle_count),
            PackedRange::open(stem_count),
        );
        self.geometry.push(id);
        self.vertex_starts.push(self.vertex_count());
        id
    }

    /// Move the most recent geometry into a new batch bound to `slot`
    ///
    /// Its vertices, triangles and stems are cut off the end of this batch and
    /// its indices rebased onto the new batch; its record is handed to `slot`.
    /// This batch keeps every earlier geometry unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the batch holds fewer than two geometries, or if the last
    /// geometry indexes vertices of an earlier one.
    pub fn split_off_last(&mut self, slot: RendererSlot, table: &GeometryTable) -> Self {
        self.assert_consistent();
        assert!(self.geometry.len() > 1, "{}: a lone geometry cannot be split off", self.slot);

        let (Some(id), Some(vertex_start)) = (self.geometry.pop(), self.vertex_starts.pop()) else {
            unreachable!("geometry and vertex starts are pushed together");
        };
        let snapshot = table.snapshot(id);
        let triangle_start = snapshot.triangles.start() as usize * 3;
        let stem_start = snapshot.stems.start() as usize * 2;

        let rebase = |indices: Vec<u32>| -> Vec<u32> {
            indices
                .into_iter()
                .map(|index| {
                    assert!(
                        index >= vertex_start,
                        "{id}: index {index} refers to a vertex of an earlier geometry"
                    );
                    index - vertex_start
                })
                .collect()
        };

        let start = vertex_start as usize;
        let tail = Self {
            slot,
            key: self.key,
            positions: self.positions.split_off(start),
            normals: self.normals.as_mut().map(|normals| normals.split_off(start)),
            uvs: self.uvs.as_mut().map(|uvs| uvs.split_off(start)),
            triangles: rebase(self.triangles.split_off(triangle_start)),
            stems: rebase(self.stems.split_off(stem_start)),
            geometry: vec![id],
            vertex_starts: vec![0],
        };

        table.reassign(id, slot, PackedRange::open(0), PackedRange::open(0));
        log::debug!(
            "Moved {id} ({} vertices) from {} to {slot} to stay under the ceiling",
            tail.vertex_count(),
            self.slot
        );
        tail
    }

    /// Check the per-vertex and per-primitive length invariants
    ///
    /// # Panics
    ///
    /// Panics when a producer left the containers inconsistent.
    pub fn assert_consistent(&self) {
        let vertex_count = self.positions.len();
        assert!(
            self.triangles.len() % 3 == 0,
            "{}: triangle index count {} is not a multiple of 3",
            self.slot,
            self.triangles.len()
        );
        assert!(
            self.stems.len() % 2 == 0,
            "{}: stem index count {} is not a multiple of 2",
            self.slot,
            self.stems.len()
        );
        if let Some(normals) = &self.normals {
            assert_eq!(normals.len(), vertex_count, "{}: normal count differs from vertex count", self.slot);
        }
        if let Some(uvs) = &self.uvs {
            assert_eq!(uvs.len(), vertex_count, "{}: uv count differs from vertex count", self.slot);
        }
        assert!(
            self.key.kind.has_triangles() || self.triangles.is_empty(),
            "{}: stems-only batch received triangles",
            self.slot
        );
    }

    /// Freeze the batch
    ///
    /// # Panics
    ///
    /// Panics if the containers are inconsistent, a count passed
    /// [`CAPACITY_CEILING`], or an index refers to a missing vertex.
    pub fn seal(self) -> SealedBatch {
        self.assert_consistent();

        let ceiling = CAPACITY_CEILING as usize;
        assert!(
            self.positions.len() <= ceiling
                && self.triangles.len() <= ceiling
                && self.stems.len() <= ceiling,
            "{}: batch exceeds the ceiling of {ceiling} ({} vertices, {} triangle indices, {} stem indices)",
            self.slot,
            self.positions.len(),
            self.triangles.len(),
            self.stems.len()
        );

        let vertex_count = self.vertex_count();
        if let Some(&index) = self
            .triangles
            .iter()
            .chain(self.stems.iter())
            .find(|&&index| index >= vertex_count)
        {
            panic!("{}: index {index} refers past the last of {vertex_count} vertices", self.slot);
        }

        log::debug!(
            "Sealed {} ({:?}): {} geometries, {} vertices, {} triangles, {} stems",
            self.slot,
            self.key,
            self.geometry.len(),
            vertex_count,
            self.triangle_count(),
            self.stem_count()
        );

        SealedBatch {
            slot: self.slot,
            key: self.key,
            positions: self.positions.into_boxed_slice(),
            normals: self.normals.map(Vec::into_boxed_slice),
            uvs: self.uvs.map(Vec::into_boxed_slice),
            triangles: self.triangles.into_boxed_slice(),
            stems: self.stems.into_boxed_slice(),
            geometry: self.geometry.into_boxed_slice(),
        }
    }
}

/// Immutable final arrays of a batch
#[derive(Debug)]
pub struct SealedBatch {
    slot: RendererSlot,
    key: BatchKey,
    positions: Box<[Vec3]>,
    normals: Option<Box<[Vec3]>>,
    uvs: Option<Box<[Vec2]>>,
    triangles: Box<[u32]>,
    stems: Box<[u32]>,
    geometry: Box<[GeometryId]>,
}

impl SealedBatch {
    /// Renderer slot the batch is drawn through
    pub const fn slot(&self) -> RendererSlot {
        self.slot
    }

    /// Sharing key
    pub const fn key(&self) -> BatchKey {
        self.key
    }

    /// Vertex arrays for the drawable backend
    pub fn mesh_data(&self) -> MeshData<'_> {
        MeshData {
            positions: &self.positions,
            normals: self.normals.as_deref(),
            uvs: self.uvs.as_deref(),
        }
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> u32 {
        (self.triangles.len() / 3) as u32
    }

    /// Number of stems
    pub fn stem_count(&self) -> u32 {
        (self.stems.len() / 2) as u32
    }

    /// Geometry allocated in this batch, in append order
    pub fn geometry_ids(&self) -> &[GeometryId] {
        &self.geometry
    }

    /// Vertex indices of the triangles in `range`
    pub fn triangle_indices(&self, range: Range<u32>) -> &[u32] {
        &self.triangles[range.start as usize * 3..range.end as usize * 3]
    }

    /// Vertex indices of the stems in `range`
    pub fn stem_indices(&self, range: Range<u32>) -> &[u32] {
        &self.stems[range.start as usize * 2..range.end as usize * 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::geometry_table::GeometryState;

    fn push_triangle(batch: &mut Batch) {
        let base = batch.vertex_count();
        for i in 0..3 {
            batch.positions.push(Vec3::new(i as f32, 0.0, 0.0));
            if let Some(normals) = batch.normals.as_mut() {
                normals.push(Vec3::z());
            }
        }
        batch.triangles.extend([base, base + 1, base + 2]);
        batch.stems.extend([base, base + 1]);
    }

    #[test]
    fn test_kind_layouts() {
        let plain = Batch::new(RendererSlot(0), BatchKey::plain(MaterialKey(1)));
        assert!(plain.normals.is_some() && plain.uvs.is_none());
        let textured = Batch::new(RendererSlot(0), BatchKey::textured(MaterialKey(1)));
        assert!(textured.normals.is_some() && textured.uvs.is_some());
        let stems = Batch::new(RendererSlot(0), BatchKey::stems_only(MaterialKey(0)));
        assert!(stems.normals.is_none() && stems.uvs.is_none());
    }

    #[test]
    fn test_begin_geometry_closes_previous_range() {
        let table = GeometryTable::new();
        let mut batch = Batch::new(RendererSlot(2), BatchKey::plain(MaterialKey(1)));

        let first = batch.begin_geometry(&table);
        push_triangle(&mut batch);
        push_triangle(&mut batch);
        let second = batch.begin_geometry(&table);
        push_triangle(&mut batch);

        assert_eq!(table.snapshot(first).triangles, PackedRange::closed(0, 2));
        assert_eq!(table.snapshot(first).stems, PackedRange::closed(0, 2));
        assert_eq!(table.snapshot(second).triangles, PackedRange::open(2));
        assert_eq!(table.snapshot(second).owner, RendererSlot(2));
        assert_eq!(table.state(second), GeometryState::Active);
        assert_eq!(batch.geometry_ids(), &[first, second]);

        let sealed = batch.seal();
        assert_eq!(sealed.triangle_count(), 3);
        assert_eq!(sealed.triangle_indices(2..3), &[6, 7, 8]);
        assert_eq!(sealed.stem_indices(0..1), &[0, 1]);
        assert_eq!(sealed.mesh_data().positions.len(), 9);
        assert!(sealed.mesh_data().uvs.is_none());
    }

    #[test]
    fn test_threshold_and_ceiling_checks() {
        let table = GeometryTable::new();
        let mut batch = Batch::new(RendererSlot(0), BatchKey::plain(MaterialKey(0)));
        batch.begin_geometry(&table);
        push_triangle(&mut batch);

        assert!(!batch.is_over_threshold(4));
        assert!(batch.is_over_threshold(3));
        assert!(!batch.would_exceed_ceiling(SizeHint { vertices: CAPACITY_CEILING - 3, ..SizeHint::default() }));
        assert!(batch.would_exceed_ceiling(SizeHint { vertices: CAPACITY_CEILING - 2, ..SizeHint::default() }));
        assert!(batch.would_exceed_ceiling(SizeHint { triangles: CAPACITY_CEILING / 3, ..SizeHint::default() }));
    }

    #[test]
    fn test_split_off_last_rebases_the_moved_geometry() {
        let table = GeometryTable::new();
        let mut batch = Batch::new(RendererSlot(0), BatchKey::plain(MaterialKey(4)));
        let first = batch.begin_geometry(&table);
        push_triangle(&mut batch);
        let second = batch.begin_geometry(&table);
        push_triangle(&mut batch);
        push_triangle(&mut batch);

        let tail = batch.split_off_last(RendererSlot(1), &table);

        assert_eq!(batch.geometry_ids(), &[first]);
        assert_eq!(batch.vertex_count(), 3);
        assert_eq!(batch.triangles, vec![0, 1, 2]);
        assert_eq!(tail.geometry_ids(), &[second]);
        assert_eq!(tail.vertex_count(), 6);
        assert_eq!(tail.normals.as_ref().map(Vec::len), Some(6));
        assert_eq!(tail.triangles, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(tail.stems, vec![0, 1, 3, 4]);

        let moved = table.snapshot(second);
        assert_eq!(moved.owner, RendererSlot(1));
        assert_eq!(moved.triangles, PackedRange::open(0));
        assert_eq!(table.snapshot(first).owner, RendererSlot(0));
        assert_eq!(table.snapshot(first).triangles.resolve(batch.triangle_count()), 0..1);
    }

    #[test]
    #[should_panic(expected = "cannot be split off")]
    fn test_lone_geometry_cannot_be_split() {
        let table = GeometryTable::new();
        let mut batch = Batch::new(RendererSlot(0), BatchKey::plain(MaterialKey(0)));
        batch.begin_geometry(&table);
        push_triangle(&mut batch);
        let _ = batch.split_off_last(RendererSlot(1), &table);
    }

    #[test]
    #[should_panic(expected = "not a multiple of 3")]
    fn test_partial_triangle_panics_on_seal() {
        let table = GeometryTable::new();
        let mut batch = Batch::new(RendererSlot(0), BatchKey::plain(MaterialKey(0)));
        batch.begin_geometry(&table);
        push_triangle(&mut batch);
        batch.triangles.pop();
        let _ = batch.seal();
    }

    #[test]
    #[should_panic(expected = "normal count differs")]
    fn test_missing_normals_panic_on_next_geometry() {
        let table = GeometryTable::new();
        let mut batch = Batch::new(RendererSlot(0), BatchKey::plain(MaterialKey(0)));
        batch.begin_geometry(&table);
        batch.positions.push(Vec3::zeros());
        batch.begin_geometry(&table);
    }

    #[test]
    #[should_panic(expected = "refers past the last")]
    fn test_dangling_index_panics_on_seal() {
        let table = GeometryTable::new();
        let mut batch = Batch::new(RendererSlot(0), BatchKey::stems_only(MaterialKey(0)));
        batch.begin_geometry(&table);
        batch.positions.push(Vec3::zeros());
        batch.stems.extend([0, 1]);
        let _ = batch.seal();
    }
}
