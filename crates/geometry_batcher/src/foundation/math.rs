//! Math utilities and types
//!
//! Provides the vector types used for vertex positions, normals and texture coordinates.

pub use nalgebra::{Vector2, Vector3};

/// 2D vector type (texture coordinates)
pub type Vec2 = Vector2<f32>;

/// 3D vector type (positions and normals)
pub type Vec3 = Vector3<f32>;

/// Unit normal of the triangle `a, b, c` with counter-clockwise winding
///
/// Degenerate triangles yield the zero vector instead of NaNs.
pub fn face_normal(a: &Vec3, b: &Vec3, c: &Vec3) -> Vec3 {
    let cross = (b - a).cross(&(c - a));
    cross.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::zeros)
}
