//! Batching stress demo
//!
//! A producer thread keeps spawning, hiding and destroying random rock
//! fragments while the main thread drains the flush queue the way a render
//! loop would. Pass a `.toml` or `.ron` file to override the batcher config.

use geometry_batcher::foundation::logging;
use geometry_batcher::foundation::math::face_normal;
use geometry_batcher::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

const FRAMES: usize = 120;
const SPAWNS_PER_FRAME: usize = 150;
const CHANGES_PER_FRAME: usize = 60;
const TICK: Duration = Duration::from_millis(16);
const ROCK_MATERIALS: [MaterialKey; 3] = [MaterialKey(1), MaterialKey(2), MaterialKey(3)];
const DEBRIS_MATERIAL: MaterialKey = MaterialKey(10);
const SEED: u64 = 0x5eed;

struct Fragment {
    id: GeometryId,
    hidden: bool,
}

/// Flat rock shard: a triangle fan with one stem along its face normal
fn spawn_shard(batcher: &mut GeometryBatcher, rng: &mut StdRng) -> GeometryId {
    let rim = rng.gen_range(3..9_u32);
    let material = ROCK_MATERIALS[rng.gen_range(0..ROCK_MATERIALS.len())];
    let center = Vec3::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0), 0.0);
    let radius = rng.gen_range(0.2..2.0_f32);

    let points: Vec<Vec3> = (0..rim)
        .map(|i| {
            let angle = i as f32 / rim as f32 * std::f32::consts::TAU;
            center + Vec3::new(angle.cos() * radius, angle.sin() * radius, rng.gen_range(-0.1..0.1))
        })
        .collect();
    let normal = face_normal(&center, &points[0], &points[1]);

    let hint = SizeHint { vertices: rim + 2, triangles: rim, stems: 1 };
    let mut handle = batcher.prepare_with_hint(BatchKey::plain(material), hint);
    let hub = handle.add_vertex_with_normal(center, normal);
    for point in &points {
        handle.add_vertex_with_normal(*point, normal);
    }
    for i in 0..rim {
        handle.add_triangle(hub, hub + 1 + i, hub + 1 + (i + 1) % rim);
    }
    let tip = handle.add_vertex_with_normal(center + normal * radius, normal);
    handle.add_stem(hub, tip);
    handle.id()
}

/// Textured decal quad
fn spawn_decal(batcher: &mut GeometryBatcher, rng: &mut StdRng) -> GeometryId {
    let origin = Vec3::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0), 0.5);
    let size = rng.gen_range(0.5..3.0_f32);

    let mut handle = batcher.prepare_textured(DEBRIS_MATERIAL);
    let corners = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
    for (u, v) in corners {
        handle.add_textured_vertex(origin + Vec3::new(u * size, v * size, 0.0), Vec3::z(), Vec2::new(u, v));
    }
    handle.add_triangle(0, 1, 2);
    handle.add_triangle(0, 2, 3);
    handle.id()
}

/// Cluster of dust streaks
fn spawn_streaks(batcher: &mut GeometryBatcher, rng: &mut StdRng) -> GeometryId {
    let origin = Vec3::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0), 1.0);
    let count = rng.gen_range(1..6);

    let mut handle = batcher.prepare_stems_only();
    for _ in 0..count {
        let from = handle.add_vertex(origin);
        let offset = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(0.0..1.0));
        let to = handle.add_vertex(origin + offset);
        handle.add_stem(from, to);
    }
    handle.id()
}

fn run_producer(mut batcher: GeometryBatcher, done: Sender<()>) -> (GeometryBatcher, Vec<Fragment>) {
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut fragments: Vec<Fragment> = Vec::new();

    for frame in 0..FRAMES {
        for _ in 0..SPAWNS_PER_FRAME {
            let id = match rng.gen_range(0..10) {
                0..=5 => spawn_shard(&mut batcher, &mut rng),
                6..=7 => spawn_decal(&mut batcher, &mut rng),
                _ => spawn_streaks(&mut batcher, &mut rng),
            };
            fragments.push(Fragment { id, hidden: false });
        }

        for _ in 0..CHANGES_PER_FRAME.min(fragments.len()) {
            let index = rng.gen_range(0..fragments.len());
            if rng.gen_bool(0.4) {
                let fragment = fragments.swap_remove(index);
                batcher.destroy(fragment.id);
            } else {
                let fragment = &mut fragments[index];
                if fragment.hidden {
                    batcher.show(fragment.id);
                } else {
                    batcher.hide(fragment.id);
                }
                fragment.hidden = !fragment.hidden;
            }
        }

        batcher.flush();
        if frame % 30 == 0 {
            log::info!("Producer frame {frame}: {} fragments alive", fragments.len());
        }
        thread::sleep(TICK / 2);
    }

    batcher.flush_with(move || {
        if done.send(()).is_err() {
            log::warn!("Consumer stopped listening before the final flush");
        }
    });
    (batcher, fragments)
}

fn run_consumer(manager: &mut DrawObjectManager<RecordingBackend>, done: &Receiver<()>) {
    let mut ticks = 0_usize;
    loop {
        let started = Instant::now();
        match manager.process_pending() {
            Ok(report) if report.executed > 0 => log::debug!("Tick {ticks}: {report:?}"),
            Ok(_) => {}
            Err(error) => log::error!("Tick {ticks} failed: {error}"),
        }
        ticks += 1;

        if done.try_recv().is_ok() {
            break;
        }
        thread::sleep(TICK.saturating_sub(started.elapsed()));
    }
    log::info!("Consumer finished after {ticks} ticks");
}

fn load_config() -> Result<BatcherConfig, ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading batcher config from {path}");
            BatcherConfig::load_from_file(&path)
        }
        None => Ok(BatcherConfig::default()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    log::info!("Starting batch stress demo");

    let config = load_config()?;
    let (batcher, mut manager) = session(config, RecordingBackend::new())?;
    let (done_tx, done_rx) = mpsc::channel();

    let started = Instant::now();
    let producer = thread::Builder::new()
        .name("producer".to_string())
        .spawn(move || run_producer(batcher, done_tx))?;

    run_consumer(&mut manager, &done_rx);
    let (batcher, fragments) = producer.join().map_err(|_| "producer thread panicked")?;

    let visible = fragments.iter().filter(|fragment| !fragment.hidden).count();
    let stats = manager.stats();
    log::info!(
        "Done in {:?}: {} flushes, {} fragments alive ({} visible)",
        started.elapsed(),
        batcher.flush_count(),
        fragments.len(),
        visible
    );
    log::info!("{stats:?}, {:.2} refreshes per batch", stats.avg_refreshes_per_batch());
    log::info!(
        "Backend holds {} drawables: {} triangles, {} stems visible",
        manager.backend().drawable_count(),
        manager.backend().visible_triangle_count(),
        manager.backend().visible_stem_count()
    );

    let live = manager.context().table().live_count() as usize;
    if live != fragments.len() {
        log::error!("Geometry table reports {live} live records, expected {}", fragments.len());
    }
    Ok(())
}
