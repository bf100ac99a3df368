//! Geometry Table
//!
//! Index-based arena of geometry records with an intrusive free list.
//!
//! # Architecture
//!
//! ```text
//! GeometryTable
//!         ├── records: RwLock<Vec<GeometryRecord>>   (write lock only to grow)
//!         │       └── word | triangles | stems        (one AtomicU32 each)
//!         └── heads: Mutex<FreeHeads>
//!                 ├── allocation  (popped by the producer)
//!                 └── reclaimed   (pushed by the consumer's refresh)
//! ```
//!
//! A free record stores the index of the next free record in its triangle
//! word. State flips (`hide` / `show` / `destroy`) compare-exchange the state
//! word under the shared read lock and never touch the free-list mutex.
//!
//! Lock order: `heads` before `records`.

use super::range::PackedRange;
use super::slots::RendererSlot;
use crate::foundation::sync::{lock, read, write};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard};

/// End-of-list marker for the intrusive free lists
const NIL: u32 = u32::MAX;

const STATE_BITS: u32 = 2;
const STATE_MASK: u32 = (1 << STATE_BITS) - 1;

/// Renderer slots must fit in the state word next to the state bits
pub const MAX_RENDERER_SLOTS: u32 = 1 << (32 - STATE_BITS);

/// Caller-visible handle of one show/hide/destroy-able piece of geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeometryId(pub(crate) u32);

impl GeometryId {
    /// Index of the record backing this id
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GeometryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "geometry#{}", self.0)
    }
}

/// Lifecycle state of a geometry record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum GeometryState {
    /// Unallocated, linked into a free list
    Free = 0,
    /// Allocated and visible
    Active = 1,
    /// Allocated but excluded from its drawable's index lists
    Hidden = 2,
    /// Released by the caller, waiting for its slot's next refresh
    Destroyed = 3,
}

impl GeometryState {
    const fn from_bits(bits: u32) -> Self {
        match bits & STATE_MASK {
            0 => Self::Free,
            1 => Self::Active,
            2 => Self::Hidden,
            _ => Self::Destroyed,
        }
    }

    /// Whether the geometry contributes to its drawable's index lists
    pub const fn is_visible(self) -> bool {
        matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Hide,
    Show,
    Destroy,
}

const fn encode_word(state: GeometryState, owner: RendererSlot) -> u32 {
    (owner.0 << STATE_BITS) | state as u32
}

const fn decode_word(word: u32) -> (GeometryState, RendererSlot) {
    (GeometryState::from_bits(word), RendererSlot(word >> STATE_BITS))
}

#[derive(Debug)]
struct GeometryRecord {
    /// State bits plus owning renderer slot
    word: AtomicU32,
    /// Packed triangle range, or the next free index while `Free`
    triangles: AtomicU32,
    /// Packed stem range
    stems: AtomicU32,
}

impl GeometryRecord {
    fn free(next: u32) -> Self {
        Self {
            word: AtomicU32::new(encode_word(GeometryState::Free, RendererSlot(0))),
            triangles: AtomicU32::new(next),
            stems: AtomicU32::new(0),
        }
    }

    fn snapshot(&self) -> RecordSnapshot {
        let (state, owner) = decode_word(self.word.load(Ordering::Acquire));
        RecordSnapshot {
            state,
            owner,
            triangles: PackedRange::unpack(self.triangles.load(Ordering::Acquire)),
            stems: PackedRange::unpack(self.stems.load(Ordering::Acquire)),
        }
    }
}

/// Point-in-time copy of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSnapshot {
    /// Lifecycle state
    pub state: GeometryState,
    /// Slot of the batch holding the geometry's data
    pub owner: RendererSlot,
    /// Triangle run inside the owning batch
    pub triangles: PackedRange,
    /// Stem run inside the owning batch
    pub stems: PackedRange,
}

#[derive(Debug)]
struct FreeHeads {
    allocation: u32,
    reclaimed: u32,
    free_count: u32,
}

/// Thread-safe table of geometry records
#[derive(Debug)]
pub struct GeometryTable {
    records: RwLock<Vec<GeometryRecord>>,
    heads: Mutex<FreeHeads>,
}

impl GeometryTable {
    /// Create an empty table; the first allocation grows it
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a table with `capacity` free records linked up front
    pub fn with_capacity(capacity: u32) -> Self {
        let mut records = Vec::new();
        let mut heads = FreeHeads {
            allocation: NIL,
            reclaimed: NIL,
            free_count: 0,
        };
        Self::link_new_records(&mut records, &mut heads, capacity);

        Self {
            records: RwLock::new(records),
            heads: Mutex::new(heads),
        }
    }

    /// Number of records added when the table runs out of free ids
    pub const fn growth_for(capacity: u32) -> u32 {
        (capacity + 22) * 3 / 2
    }

    /// Allocate an `Active` record owned by `owner`
    ///
    /// Reuses ids reclaimed by refreshes before growing the table.
    pub fn allocate(&self, owner: RendererSlot, triangles: PackedRange, stems: PackedRange) -> GeometryId {
        assert!(
            owner.0 < MAX_RENDERER_SLOTS,
            "{owner} does not fit in a geometry record"
        );

        let mut heads = lock(&self.heads);
        if heads.allocation == NIL {
            heads.allocation = std::mem::replace(&mut heads.reclaimed, NIL);
        }
        if heads.allocation == NIL {
            let mut records = write(&self.records);
            let capacity = records.len() as u32;
            let additional = Self::growth_for(capacity);
            Self::link_new_records(&mut records, &mut heads, additional);
            log::debug!("Geometry table grew from {} to {} records", capacity, records.len());
        }

        let records = read(&self.records);
        let index = heads.allocation;
        let record = &records[index as usize];
        heads.allocation = record.triangles.load(Ordering::Relaxed);
        heads.free_count -= 1;

        record.triangles.store(triangles.pack(), Ordering::Release);
        record.stems.store(stems.pack(), Ordering::Release);
        record.word.store(encode_word(GeometryState::Active, owner), Ordering::Release);

        GeometryId(index)
    }

    /// Overwrite the ranges of a live record
    pub fn set_ranges(&self, id: GeometryId, triangles: PackedRange, stems: PackedRange) {
        let records = read(&self.records);
        let record = Self::record(&records, id);
        debug_assert_ne!(
            decode_word(record.word.load(Ordering::Acquire)).0,
            GeometryState::Free,
            "{id} is not allocated"
        );
        record.triangles.store(triangles.pack(), Ordering::Release);
        record.stems.store(stems.pack(), Ordering::Release);
    }

    /// Move a live record to another slot, keeping its state
    pub fn reassign(&self, id: GeometryId, owner: RendererSlot, triangles: PackedRange, stems: PackedRange) {
        assert!(
            owner.0 < MAX_RENDERER_SLOTS,
            "{owner} does not fit in a geometry record"
        );

        let records = read(&self.records);
        let record = Self::record(&records, id);
        record.triangles.store(triangles.pack(), Ordering::Release);
        record.stems.store(stems.pack(), Ordering::Release);

        let mut current = record.word.load(Ordering::Acquire);
        loop {
            let (state, _) = decode_word(current);
            assert_ne!(state, GeometryState::Free, "{id} is not allocated");
            match record.word.compare_exchange_weak(
                current,
                encode_word(state, owner),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Hide a geometry; returns its slot if the state changed
    ///
    /// # Panics
    ///
    /// Panics if the id is not allocated or has been destroyed.
    pub fn hide(&self, id: GeometryId) -> Option<RendererSlot> {
        self.transition(id, Transition::Hide)
    }

    /// Show a hidden geometry; returns its slot if the state changed
    ///
    /// # Panics
    ///
    /// Panics if the id is not allocated or has been destroyed.
    pub fn show(&self, id: GeometryId) -> Option<RendererSlot> {
        self.transition(id, Transition::Show)
    }

    /// Destroy a geometry; returns its slot if the state changed
    ///
    /// # Panics
    ///
    /// Panics if the id is not allocated.
    pub fn destroy(&self, id: GeometryId) -> Option<RendererSlot> {
        self.transition(id, Transition::Destroy)
    }

    fn transition(&self, id: GeometryId, transition: Transition) -> Option<RendererSlot> {
        let records = read(&self.records);
        let record = Self::record(&records, id);

        let mut current = record.word.load(Ordering::Acquire);
        loop {
            let (state, owner) = decode_word(current);
            let target = match (transition, state) {
                (_, GeometryState::Free) => panic!("{id} is not allocated"),
                (Transition::Hide | Transition::Show, GeometryState::Destroyed) => {
                    panic!("{id} used after destroy")
                }
                (Transition::Hide, GeometryState::Hidden)
                | (Transition::Show, GeometryState::Active)
                | (Transition::Destroy, GeometryState::Destroyed) => return None,
                (Transition::Hide, GeometryState::Active) => GeometryState::Hidden,
                (Transition::Show, GeometryState::Hidden) => GeometryState::Active,
                (Transition::Destroy, _) => GeometryState::Destroyed,
            };

            match record.word.compare_exchange_weak(
                current,
                encode_word(target, owner),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(owner),
                Err(actual) => current = actual,
            }
        }
    }

    /// Current state of a record
    pub fn state(&self, id: GeometryId) -> GeometryState {
        self.snapshot(id).state
    }

    /// Copy of a record's state, owner and ranges
    pub fn snapshot(&self, id: GeometryId) -> RecordSnapshot {
        let records = read(&self.records);
        Self::record(&records, id).snapshot()
    }

    /// Hold the shared lock while reading many records
    pub fn reader(&self) -> TableReader<'_> {
        TableReader {
            records: read(&self.records),
        }
    }

    /// Return destroyed records to the reclaimed free list
    ///
    /// # Panics
    ///
    /// Panics if any id is not in the `Destroyed` state.
    pub fn recycle(&self, ids: &[GeometryId]) {
        if ids.is_empty() {
            return;
        }

        let mut heads = lock(&self.heads);
        let records = read(&self.records);
        for &id in ids {
            let record = Self::record(&records, id);
            let (state, _) = decode_word(record.word.load(Ordering::Acquire));
            assert_eq!(state, GeometryState::Destroyed, "{id} recycled while {state:?}");

            record.triangles.store(heads.reclaimed, Ordering::Relaxed);
            record.stems.store(0, Ordering::Relaxed);
            record
                .word
                .store(encode_word(GeometryState::Free, RendererSlot(0)), Ordering::Release);
            heads.reclaimed = id.0;
            heads.free_count += 1;
        }
    }

    /// Number of records, free or not
    pub fn capacity(&self) -> u32 {
        read(&self.records).len() as u32
    }

    /// Number of records not on a free list
    pub fn live_count(&self) -> u32 {
        let heads = lock(&self.heads);
        let records = read(&self.records);
        records.len() as u32 - heads.free_count
    }

    fn record(records: &[GeometryRecord], id: GeometryId) -> &GeometryRecord {
        records
            .get(id.0 as usize)
            .unwrap_or_else(|| panic!("{id} is outside the geometry table"))
    }

    fn link_new_records(records: &mut Vec<GeometryRecord>, heads: &mut FreeHeads, additional: u32) {
        if additional == 0 {
            return;
        }

        let old_len = records.len() as u32;
        let new_len = old_len
            .checked_add(additional)
            .filter(|&len| len < NIL)
            .expect("geometry table exhausted the id space");

        records.reserve(additional as usize);
        for index in old_len..new_len {
            let next = if index + 1 < new_len { index + 1 } else { heads.allocation };
            records.push(GeometryRecord::free(next));
        }
        heads.allocation = old_len;
        heads.free_count += additional;
    }
}

impl Default for GeometryTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared-lock view used by refreshes to read many records at once
pub struct TableReader<'a> {
    records: RwLockReadGuard<'a, Vec<GeometryRecord>>,
}

impl TableReader<'_> {
    /// Copy of a record's state, owner and ranges
    pub fn snapshot(&self, id: GeometryId) -> RecordSnapshot {
        GeometryTable::record(&self.records, id).snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn allocate(table: &GeometryTable, slot: u32) -> GeometryId {
        table.allocate(RendererSlot(slot), PackedRange::open(0), PackedRange::EMPTY)
    }

    #[test]
    fn test_first_allocation_grows_table() {
        let table = GeometryTable::new();
        assert_eq!(table.capacity(), 0);

        let id = allocate(&table, 0);
        assert_eq!(id.index(), 0);
        assert_eq!(table.capacity(), GeometryTable::growth_for(0));
        assert_eq!(table.capacity(), 33);
        assert_eq!(table.live_count(), 1);
        assert_eq!(table.state(id), GeometryState::Active);
    }

    #[test]
    fn test_growth_policy() {
        let table = GeometryTable::with_capacity(2);
        let ids: Vec<_> = (0..3).map(|_| allocate(&table, 0)).collect();
        assert_eq!(ids.iter().map(|id| id.index()).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(table.capacity(), 2 + GeometryTable::growth_for(2));
    }

    #[test]
    fn test_snapshot_carries_owner_and_ranges() {
        let table = GeometryTable::new();
        let id = table.allocate(RendererSlot(9), PackedRange::closed(1, 4), PackedRange::open(2));
        let snapshot = table.snapshot(id);
        assert_eq!(snapshot.owner, RendererSlot(9));
        assert_eq!(snapshot.triangles, PackedRange::closed(1, 4));
        assert_eq!(snapshot.stems, PackedRange::open(2));

        table.set_ranges(id, PackedRange::closed(1, 5), PackedRange::closed(2, 3));
        assert_eq!(table.snapshot(id).triangles, PackedRange::closed(1, 5));
        assert_eq!(table.snapshot(id).stems, PackedRange::closed(2, 3));
    }

    #[test]
    fn test_reassign_keeps_state() {
        let table = GeometryTable::new();
        let id = table.allocate(RendererSlot(1), PackedRange::closed(4, 6), PackedRange::open(3));
        table.hide(id);

        table.reassign(id, RendererSlot(8), PackedRange::open(0), PackedRange::open(0));
        let snapshot = table.snapshot(id);
        assert_eq!(snapshot.state, GeometryState::Hidden);
        assert_eq!(snapshot.owner, RendererSlot(8));
        assert_eq!(snapshot.triangles, PackedRange::open(0));
        assert_eq!(table.show(id), Some(RendererSlot(8)));
    }

    #[test]
    fn test_transitions_are_idempotent() {
        let table = GeometryTable::new();
        let id = allocate(&table, 3);

        assert_eq!(table.show(id), None);
        assert_eq!(table.hide(id), Some(RendererSlot(3)));
        assert_eq!(table.hide(id), None);
        assert_eq!(table.state(id), GeometryState::Hidden);
        assert_eq!(table.show(id), Some(RendererSlot(3)));
        assert_eq!(table.destroy(id), Some(RendererSlot(3)));
        assert_eq!(table.destroy(id), None);
        assert_eq!(table.state(id), GeometryState::Destroyed);
    }

    #[test]
    #[should_panic(expected = "used after destroy")]
    fn test_show_after_destroy_panics() {
        let table = GeometryTable::new();
        let id = allocate(&table, 0);
        table.destroy(id);
        table.show(id);
    }

    #[test]
    #[should_panic(expected = "is not allocated")]
    fn test_transition_on_free_record_panics() {
        let table = GeometryTable::with_capacity(4);
        table.hide(GeometryId(2));
    }

    #[test]
    #[should_panic(expected = "outside the geometry table")]
    fn test_unknown_id_panics() {
        let table = GeometryTable::new();
        table.destroy(GeometryId(100));
    }

    #[test]
    #[should_panic(expected = "recycled while")]
    fn test_recycling_live_record_panics() {
        let table = GeometryTable::new();
        let id = allocate(&table, 0);
        table.recycle(&[id]);
    }

    #[test]
    fn test_reclaimed_ids_are_reused_before_growing() {
        let table = GeometryTable::with_capacity(2);
        let a = allocate(&table, 0);
        let b = allocate(&table, 0);
        table.destroy(a);
        table.destroy(b);
        table.recycle(&[a, b]);
        assert_eq!(table.state(a), GeometryState::Free);
        assert_eq!(table.live_count(), 0);

        let c = allocate(&table, 1);
        let d = allocate(&table, 1);
        assert_eq!(table.capacity(), 2);
        let mut reused = vec![c, d];
        reused.sort();
        assert_eq!(reused, vec![a, b]);
        assert_eq!(table.snapshot(c).owner, RendererSlot(1));
    }

    #[test]
    fn test_concurrent_allocation_and_recycling() {
        let table = Arc::new(GeometryTable::new());
        let destroyed: Vec<_> = (0..200).map(|_| allocate(&table, 0)).collect();
        for &id in &destroyed {
            table.destroy(id);
        }

        let consumer = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for chunk in destroyed.chunks(10) {
                    table.recycle(chunk);
                }
            })
        };

        let mut fresh = Vec::new();
        for _ in 0..500 {
            let id = allocate(&table, 1);
            table.hide(id);
            fresh.push(id);
        }
        consumer.join().expect("consumer thread panicked");

        fresh.sort();
        fresh.dedup();
        assert_eq!(fresh.len(), 500);
        assert_eq!(table.live_count(), 500);
        assert!(fresh.iter().all(|&id| table.state(id) == GeometryState::Hidden));
    }
}
