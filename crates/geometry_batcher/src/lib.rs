//! # Geometry Batcher
//!
//! Merges many small, independently created pieces of geometry into a few
//! large drawables, and keeps per-piece visibility current without rebuilding
//! vertex data.
//!
//! ## Features
//!
//! - **Batching**: geometry sharing a material and vertex layout shares a drawable
//! - **Visibility**: hide, show and destroy individual pieces through a [`GeometryId`](batching::GeometryId)
//! - **Two threads**: a producer fills batches, a consumer owns every drawable
//! - **Backend-agnostic**: drawables live behind the [`DrawableBackend`](render::DrawableBackend) trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use geometry_batcher::prelude::*;
//!
//! fn main() -> Result<(), BatchError> {
//!     let (mut batcher, mut manager) = session(BatcherConfig::default(), RecordingBackend::new())?;
//!
//!     let mut handle = batcher.prepare_plain(MaterialKey(1));
//!     let a = handle.add_vertex_with_normal(Vec3::zeros(), Vec3::z());
//!     let b = handle.add_vertex_with_normal(Vec3::x(), Vec3::z());
//!     let c = handle.add_vertex_with_normal(Vec3::y(), Vec3::z());
//!     handle.add_triangle(a, b, c);
//!     let id = handle.id();
//!
//!     batcher.flush();
//!     manager.process_pending()?;
//!
//!     batcher.hide(id);
//!     batcher.flush();
//!     manager.process_pending()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::cast_precision_loss)]

pub mod foundation;
pub mod config;
pub mod render;
pub mod batching;

pub use batching::session;

/// Common imports for batcher users
pub mod prelude {
    pub use crate::{
        batching::{
            session, BatchError, BatchKey, BatchResult, BatchStats, DrainReport, DrawObjectManager,
            GeometryBatcher, GeometryHandle, GeometryId, GeometryKind, GeometryState, SizeHint,
        },
        config::{BatcherConfig, Config, ConfigError},
        foundation::math::{Vec2, Vec3},
        render::{DrawableBackend, DrawableHandle, MaterialKey, MeshData, RecordingBackend, SubMesh, Topology},
    };
}
