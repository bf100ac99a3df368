//! End-to-end batching scenarios driving a producer and a consumer together

mod concurrency;

use super::{session, DrawObjectManager, GeometryBatcher, GeometryId};
use crate::config::BatcherConfig;
use crate::foundation::logging;
use crate::foundation::math::{face_normal, Vec3};
use crate::render::{MaterialKey, RecordedDrawable, RecordingBackend};

type Manager = DrawObjectManager<RecordingBackend>;

fn start(config: BatcherConfig) -> (GeometryBatcher, Manager) {
    logging::init_for_tests();
    session(config, RecordingBackend::new()).expect("valid session")
}

/// Unit quad at `offset`: four vertices, two triangles and one stem along its normal
fn add_quad(batcher: &mut GeometryBatcher, material: MaterialKey, offset: f32) -> GeometryId {
    let corners = [
        Vec3::new(offset, 0.0, 0.0),
        Vec3::new(offset + 1.0, 0.0, 0.0),
        Vec3::new(offset + 1.0, 1.0, 0.0),
        Vec3::new(offset, 1.0, 0.0),
    ];
    let normal = face_normal(&corners[0], &corners[1], &corners[2]);

    let mut handle = batcher.prepare_plain(material);
    for corner in corners {
        handle.add_vertex_with_normal(corner, normal);
    }
    handle.add_triangle(0, 1, 2);
    handle.add_triangle(0, 2, 3);
    let tip = handle.add_vertex_with_normal(corners[0] + normal, normal);
    handle.add_stem(0, tip);
    handle.id()
}

/// One triangle emitted for both faces, sharing three vertices
fn add_two_sided_triangle(batcher: &mut GeometryBatcher, material: MaterialKey) -> GeometryId {
    let mut handle = batcher.prepare_plain(material);
    let a = handle.add_vertex_with_normal(Vec3::zeros(), Vec3::z());
    let b = handle.add_vertex_with_normal(Vec3::x(), Vec3::z());
    let c = handle.add_vertex_with_normal(Vec3::y(), Vec3::z());
    handle.add_triangle(a, b, c);
    handle.add_triangle(a, c, b);
    handle.id()
}

fn flush_and_apply(batcher: &mut GeometryBatcher, manager: &mut Manager) {
    batcher.flush();
    manager.process_pending().expect("drain succeeds");
}

/// Recorded drawable currently holding the data of `id`
fn drawable_of<'a>(manager: &'a Manager, id: GeometryId) -> &'a RecordedDrawable {
    let slot = manager.context().table().snapshot(id).owner;
    let handle = manager.drawable(slot).expect("slot has a drawable");
    manager.backend().get(handle).expect("backend knows the drawable")
}
