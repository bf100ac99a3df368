//! # Drawable Backend Abstraction
//!
//! The batcher never issues draw calls. It hands flat vertex arrays and index
//! lists to a [`DrawableBackend`], which owns whatever graphics objects those
//! turn into (meshes, renderer components, materials).
//!
//! ## Architecture
//!
//! - **DrawableBackend**: create / re-index / destroy a drawable
//! - **MeshData**: borrowed vertex arrays of one sealed batch
//! - **SubMesh**: one index list plus the material it is drawn with
//! - **RecordingBackend**: in-memory backend for tests and headless runs

pub mod recording;

pub use recording::{RecordedDrawable, RecordingBackend};

use crate::foundation::math::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Identifier of a material known to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MaterialKey(pub u32);

/// Handle to a drawable stored in the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawableHandle(pub u64);

/// Primitive topology of a sub-mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Index triples forming triangles
    Triangles,
    /// Index pairs forming line segments (stems)
    Lines,
}

/// Vertex arrays of one drawable
#[derive(Debug, Clone, Copy)]
pub struct MeshData<'a> {
    /// Vertex positions
    pub positions: &'a [Vec3],
    /// Per-vertex normals, same length as `positions` when present
    pub normals: Option<&'a [Vec3]>,
    /// Per-vertex texture coordinates, same length as `positions` when present
    pub uvs: Option<&'a [Vec2]>,
}

/// One index list of a drawable and the material it is drawn with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubMesh {
    /// How `indices` is interpreted
    pub topology: Topology,
    /// Indices into the drawable's vertex arrays
    pub indices: Vec<u32>,
    /// Material bound to this index range
    pub material: MaterialKey,
}

impl SubMesh {
    /// Number of primitives (triangles or lines) in this sub-mesh
    pub fn primitive_count(&self) -> usize {
        match self.topology {
            Topology::Triangles => self.indices.len() / 3,
            Topology::Lines => self.indices.len() / 2,
        }
    }
}

/// Errors reported by a drawable backend
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The backend could not create the drawable
    ///
    /// Typically out of memory or vertex data the backend cannot accept.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// The handle does not name a live drawable
    #[error("Unknown drawable: {0:?}")]
    UnknownDrawable(DrawableHandle),

    /// Backend-specific error occurred
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Graphics-side collaborator that turns batched arrays into drawables
///
/// Called only from the consumer thread that drains the flush queue.
pub trait DrawableBackend {
    /// Build a new drawable from vertex arrays; it has no index ranges until
    /// [`set_index_ranges`](Self::set_index_ranges) is called
    fn create_drawable(&mut self, mesh: MeshData<'_>) -> BackendResult<DrawableHandle>;

    /// Replace every index range of a drawable
    ///
    /// `sub_meshes` holds at most one triangle and one line sub-mesh and is
    /// empty when nothing in the drawable is currently visible.
    fn set_index_ranges(&mut self, handle: DrawableHandle, sub_meshes: &[SubMesh]) -> BackendResult<()>;

    /// Destroy a drawable and release its resources
    fn destroy_drawable(&mut self, handle: DrawableHandle) -> BackendResult<()>;
}

impl<B: DrawableBackend + ?Sized> DrawableBackend for Box<B> {
    fn create_drawable(&mut self, mesh: MeshData<'_>) -> BackendResult<DrawableHandle> {
        (**self).create_drawable(mesh)
    }

    fn set_index_ranges(&mut self, handle: DrawableHandle, sub_meshes: &[SubMesh]) -> BackendResult<()> {
        (**self).set_index_ranges(handle, sub_meshes)
    }

    fn destroy_drawable(&mut self, handle: DrawableHandle) -> BackendResult<()> {
        (**self).destroy_drawable(handle)
    }
}
