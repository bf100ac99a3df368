//! Producer handle into an open batch

use super::batch::{Batch, GeometryKind};
use super::geometry_table::GeometryId;
use super::slots::RendererSlot;
use crate::foundation::math::{Vec2, Vec3};

/// Write access to an open batch on behalf of one freshly allocated geometry
///
/// The raw containers are shared by every geometry in the batch, so indices
/// written through [`triangles`](Self::triangles) and [`stems`](Self::stems)
/// are batch-global. The `add_*` helpers take indices local to this geometry
/// and offset them by [`base_vertex`](Self::base_vertex).
#[derive(Debug)]
pub struct GeometryHandle<'a> {
    id: GeometryId,
    base_vertex: u32,
    batch: &'a mut Batch,
}

impl<'a> GeometryHandle<'a> {
    pub(super) fn new(id: GeometryId, batch: &'a mut Batch) -> Self {
        Self {
            id,
            base_vertex: batch.vertex_count(),
            batch,
        }
    }

    /// Id used to hide, show or destroy this geometry later
    pub const fn id(&self) -> GeometryId {
        self.id
    }

    /// Batch-global index of this geometry's first vertex
    pub const fn base_vertex(&self) -> u32 {
        self.base_vertex
    }

    /// Vertex layout of the underlying batch
    pub fn kind(&self) -> GeometryKind {
        self.batch.key().kind
    }

    /// Renderer slot of the underlying batch
    pub fn slot(&self) -> RendererSlot {
        self.batch.slot()
    }

    /// Vertices this geometry has appended so far
    pub fn vertex_count(&self) -> u32 {
        self.batch.vertex_count() - self.base_vertex
    }

    /// Shared vertex positions
    pub fn positions(&mut self) -> &mut Vec<Vec3> {
        &mut self.batch.positions
    }

    /// Shared normals (absent for stems-only batches)
    pub fn normals(&mut self) -> Option<&mut Vec<Vec3>> {
        self.batch.normals.as_mut()
    }

    /// Shared texture coordinates (textured batches only)
    pub fn uvs(&mut self) -> Option<&mut Vec<Vec2>> {
        self.batch.uvs.as_mut()
    }

    /// Shared flattened triangle indices (absent for stems-only batches)
    pub fn triangles(&mut self) -> Option<&mut Vec<u32>> {
        if self.batch.key().kind.has_triangles() {
            Some(&mut self.batch.triangles)
        } else {
            None
        }
    }

    /// Shared flattened stem indices
    pub fn stems(&mut self) -> &mut Vec<u32> {
        &mut self.batch.stems
    }

    /// Append a position-only vertex to a stems-only batch; returns its local index
    pub fn add_vertex(&mut self, position: Vec3) -> u32 {
        assert_eq!(self.kind(), GeometryKind::StemsOnly, "add_vertex needs a stems-only batch");
        self.batch.positions.push(position);
        self.vertex_count() - 1
    }

    /// Append a vertex to a plain batch; returns its local index
    pub fn add_vertex_with_normal(&mut self, position: Vec3, normal: Vec3) -> u32 {
        assert_eq!(self.kind(), GeometryKind::Plain, "add_vertex_with_normal needs a plain batch");
        self.batch.positions.push(position);
        if let Some(normals) = self.batch.normals.as_mut() {
            normals.push(normal);
        }
        self.vertex_count() - 1
    }

    /// Append a vertex to a textured batch; returns its local index
    pub fn add_textured_vertex(&mut self, position: Vec3, normal: Vec3, uv: Vec2) -> u32 {
        assert_eq!(self.kind(), GeometryKind::Textured, "add_textured_vertex needs a textured batch");
        self.batch.positions.push(position);
        if let Some(normals) = self.batch.normals.as_mut() {
            normals.push(normal);
        }
        if let Some(uvs) = self.batch.uvs.as_mut() {
            uvs.push(uv);
        }
        self.vertex_count() - 1
    }

    /// Append a triangle given local vertex indices
    pub fn add_triangle(&mut self, a: u32, b: u32, c: u32) {
        assert!(self.kind().has_triangles(), "stems-only batches take no triangles");
        let base = self.base_vertex;
        self.batch.triangles.extend([base + a, base + b, base + c]);
    }

    /// Append a stem given local vertex indices
    pub fn add_stem(&mut self, a: u32, b: u32) {
        let base = self.base_vertex;
        self.batch.stems.extend([base + a, base + b]);
    }
}
