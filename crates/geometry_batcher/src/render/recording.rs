//! In-memory drawable backend
//!
//! Keeps a copy of everything the batcher hands over so callers can inspect
//! exactly what a real backend would have received.

use super::{BackendResult, DrawableBackend, DrawableHandle, MeshData, RenderError, SubMesh, Topology};
use crate::foundation::math::{Vec2, Vec3};
use slotmap::{DefaultKey, Key, KeyData, SlotMap};

/// Snapshot of one drawable held by [`RecordingBackend`]
#[derive(Debug, Clone, Default)]
pub struct RecordedDrawable {
    /// Vertex positions given at creation
    pub positions: Vec<Vec3>,
    /// Normals given at creation
    pub normals: Option<Vec<Vec3>>,
    /// Texture coordinates given at creation
    pub uvs: Option<Vec<Vec2>>,
    /// Index ranges from the latest update
    pub sub_meshes: Vec<SubMesh>,
    /// How many times the index ranges were replaced
    pub index_updates: usize,
}

impl RecordedDrawable {
    /// Current sub-mesh of the given topology, if any
    pub fn sub_mesh(&self, topology: Topology) -> Option<&SubMesh> {
        self.sub_meshes.iter().find(|sub| sub.topology == topology)
    }

    /// Visible triangle indices (empty when there is no triangle sub-mesh)
    pub fn triangle_indices(&self) -> &[u32] {
        self.sub_mesh(Topology::Triangles)
            .map(|sub| sub.indices.as_slice())
            .unwrap_or_default()
    }

    /// Visible stem indices (empty when there is no line sub-mesh)
    pub fn stem_indices(&self) -> &[u32] {
        self.sub_mesh(Topology::Lines)
            .map(|sub| sub.indices.as_slice())
            .unwrap_or_default()
    }

    /// Whether every index refers to a vertex of this drawable
    pub fn indices_in_bounds(&self) -> bool {
        let vertex_count = self.positions.len() as u32;
        self.sub_meshes
            .iter()
            .flat_map(|sub| sub.indices.iter())
            .all(|&index| index < vertex_count)
    }
}

/// Backend that records drawables in memory instead of talking to a GPU
#[derive(Debug, Default)]
pub struct RecordingBackend {
    drawables: SlotMap<DefaultKey, RecordedDrawable>,
    created: usize,
    destroyed: usize,
}

impl RecordingBackend {
    /// Create an empty recording backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live drawables
    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    /// Total drawables ever created
    pub fn created_count(&self) -> usize {
        self.created
    }

    /// Total drawables ever destroyed
    pub fn destroyed_count(&self) -> usize {
        self.destroyed
    }

    /// Look up a live drawable
    pub fn get(&self, handle: DrawableHandle) -> Option<&RecordedDrawable> {
        self.drawables.get(Self::key(handle))
    }

    /// Iterate over every live drawable
    pub fn drawables(&self) -> impl Iterator<Item = (DrawableHandle, &RecordedDrawable)> {
        self.drawables
            .iter()
            .map(|(key, drawable)| (DrawableHandle(key.data().as_ffi()), drawable))
    }

    /// Total visible triangles across all drawables
    pub fn visible_triangle_count(&self) -> usize {
        self.drawables
            .values()
            .map(|drawable| drawable.sub_mesh(Topology::Triangles).map_or(0, SubMesh::primitive_count))
            .sum()
    }

    /// Total visible stems across all drawables
    pub fn visible_stem_count(&self) -> usize {
        self.drawables
            .values()
            .map(|drawable| drawable.sub_mesh(Topology::Lines).map_or(0, SubMesh::primitive_count))
            .sum()
    }

    fn key(handle: DrawableHandle) -> DefaultKey {
        KeyData::from_ffi(handle.0).into()
    }
}

impl DrawableBackend for RecordingBackend {
    fn create_drawable(&mut self, mesh: MeshData<'_>) -> BackendResult<DrawableHandle> {
        if mesh.positions.is_empty() {
            return Err(RenderError::ResourceCreationFailed(
                "drawable has no vertices".to_string(),
            ));
        }

        let key = self.drawables.insert(RecordedDrawable {
            positions: mesh.positions.to_vec(),
            normals: mesh.normals.map(<[Vec3]>::to_vec),
            uvs: mesh.uvs.map(<[Vec2]>::to_vec),
            sub_meshes: Vec::new(),
            index_updates: 0,
        });
        self.created += 1;

        Ok(DrawableHandle(key.data().as_ffi()))
    }

    fn set_index_ranges(&mut self, handle: DrawableHandle, sub_meshes: &[SubMesh]) -> BackendResult<()> {
        let drawable = self
            .drawables
            .get_mut(Self::key(handle))
            .ok_or(RenderError::UnknownDrawable(handle))?;

        drawable.sub_meshes = sub_meshes.to_vec();
        drawable.index_updates += 1;
        Ok(())
    }

    fn destroy_drawable(&mut self, handle: DrawableHandle) -> BackendResult<()> {
        self.drawables
            .remove(Self::key(handle))
            .ok_or(RenderError::UnknownDrawable(handle))?;
        self.destroyed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MaterialKey;

    fn triangle() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_create_update_destroy() {
        let mut backend = RecordingBackend::new();
        let positions = triangle();
        let handle = backend
            .create_drawable(MeshData { positions: &positions, normals: None, uvs: None })
            .expect("create should succeed");
        assert_eq!(backend.drawable_count(), 1);

        backend
            .set_index_ranges(
                handle,
                &[SubMesh { topology: Topology::Triangles, indices: vec![0, 1, 2], material: MaterialKey(3) }],
            )
            .expect("update should succeed");

        let drawable = backend.get(handle).expect("drawable exists");
        assert_eq!(drawable.triangle_indices(), &[0, 1, 2]);
        assert!(drawable.stem_indices().is_empty());
        assert!(drawable.indices_in_bounds());
        assert_eq!(backend.visible_triangle_count(), 1);

        backend.destroy_drawable(handle).expect("destroy should succeed");
        assert_eq!(backend.drawable_count(), 0);
        assert_eq!(backend.destroyed_count(), 1);
        assert!(matches!(
            backend.destroy_drawable(handle),
            Err(RenderError::UnknownDrawable(_))
        ));
    }

    #[test]
    fn test_empty_mesh_is_rejected() {
        let mut backend = RecordingBackend::new();
        let result = backend.create_drawable(MeshData { positions: &[], normals: None, uvs: None });
        assert!(matches!(result, Err(RenderError::ResourceCreationFailed(_))));
        assert_eq!(backend.created_count(), 0);
    }
}
