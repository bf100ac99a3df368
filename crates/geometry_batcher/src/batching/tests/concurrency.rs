use super::*;
use crate::batching::GeometryState;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

const HULL: MaterialKey = MaterialKey(3);

/// Drain on this thread until the producer signals through `done`
fn pump_until(manager: &mut Manager, done: &Receiver<()>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        manager.process_pending().expect("drain succeeds");
        if done.try_recv().is_ok() {
            return;
        }
        assert!(Instant::now() < deadline, "producer never signalled");
        thread::yield_now();
    }
}

#[test]
fn test_destroy_races_with_refresh() {
    let config = BatcherConfig::default().with_seal_threshold(64);
    let (mut batcher, mut manager) = start(config);
    let (ready_tx, ready_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    let producer = thread::spawn(move || {
        let ids: Vec<_> = (0..400)
            .map(|i| add_quad(&mut batcher, HULL, i as f32 * 2.0))
            .collect();
        batcher.flush_with(move || ready_tx.send(()).expect("test is waiting"));

        // Visibility churn while the consumer may still be refreshing
        for (i, &id) in ids.iter().enumerate() {
            match i % 4 {
                0 => batcher.destroy(id),
                1 => batcher.hide(id),
                _ => {}
            }
            if i % 25 == 0 {
                batcher.flush();
            }
        }
        batcher.flush_with(move || done_tx.send(()).expect("test is waiting"));
        (batcher, ids)
    });

    pump_until(&mut manager, &ready_rx);
    pump_until(&mut manager, &done_rx);
    let (batcher, ids) = producer.join().expect("producer panicked");

    let backend = manager.backend();
    assert_eq!(backend.visible_triangle_count(), 200 * 2);
    assert_eq!(backend.visible_stem_count(), 200);
    assert!(backend.drawables().all(|(_, drawable)| drawable.indices_in_bounds()));

    for (i, &id) in ids.iter().enumerate() {
        let expected = match i % 4 {
            0 => GeometryState::Free,
            1 => GeometryState::Hidden,
            _ => GeometryState::Active,
        };
        assert_eq!(batcher.geometry_state(id), expected, "{id}");
    }
    assert_eq!(manager.context().table().live_count(), 300);
}

#[test]
fn test_producer_allocates_while_consumer_recycles() {
    let (mut batcher, mut manager) = start(BatcherConfig::default().with_seal_threshold(32));
    let first: Vec<_> = (0..200).map(|i| add_quad(&mut batcher, HULL, i as f32)).collect();
    flush_and_apply(&mut batcher, &mut manager);
    for &id in &first {
        batcher.destroy(id);
    }
    batcher.flush();

    let (done_tx, done_rx) = mpsc::channel();
    let producer = thread::spawn(move || {
        let second: Vec<_> = (0..200).map(|i| add_quad(&mut batcher, HULL, i as f32)).collect();
        batcher.flush_with(move || done_tx.send(()).expect("test is waiting"));
        (batcher, second)
    });

    pump_until(&mut manager, &done_rx);
    let (batcher, mut second) = producer.join().expect("producer panicked");

    second.sort();
    second.dedup();
    assert_eq!(second.len(), 200);
    assert!(second.iter().all(|&id| batcher.geometry_state(id) == GeometryState::Active));
    assert_eq!(manager.backend().visible_triangle_count(), 400);
    assert_eq!(manager.context().table().live_count(), 200);
}
