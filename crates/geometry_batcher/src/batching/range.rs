//! Packed primitive ranges
//!
//! A geometry's triangles (or stems) occupy a contiguous run of primitives in
//! its batch. The run is stored as two `u16` counters packed into one `u32`
//! so it can live in an atomic word of the geometry table.

use std::ops::Range;

/// Largest vertex count, triangle-index count or stem-index count one batch may hold
pub const CAPACITY_CEILING: u32 = 32_767;

/// `stop` value meaning "through the end of the sealed array"
pub const THROUGH_END: u16 = u16::MAX;

/// `[start, stop)` run of primitives inside a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedRange {
    start: u16,
    stop: u16,
}

impl PackedRange {
    /// Range covering no primitives
    pub const EMPTY: Self = Self { start: 0, stop: 0 };

    /// Range starting at `start` whose end is not known yet
    pub fn open(start: u32) -> Self {
        Self {
            start: Self::counter(start),
            stop: THROUGH_END,
        }
    }

    /// Range with a known end
    ///
    /// # Panics
    ///
    /// Panics if `stop < start` or either bound exceeds [`CAPACITY_CEILING`].
    pub fn closed(start: u32, stop: u32) -> Self {
        assert!(start <= stop, "range start {start} is past its stop {stop}");
        Self {
            start: Self::counter(start),
            stop: Self::counter(stop),
        }
    }

    /// Close an open range at `stop`; closed ranges are returned unchanged
    pub fn close_at(self, stop: u32) -> Self {
        if self.is_open() {
            Self::closed(u32::from(self.start), stop)
        } else {
            self
        }
    }

    /// Whether the end is still the "through the end" sentinel
    pub const fn is_open(self) -> bool {
        self.stop == THROUGH_END
    }

    /// First primitive of the range
    pub const fn start(self) -> u32 {
        self.start as u32
    }

    /// Concrete primitive range, clamping to `len` primitives
    ///
    /// The sentinel resolves to `len`; a start past `len` yields an empty range.
    pub fn resolve(self, len: u32) -> Range<u32> {
        let stop = if self.is_open() {
            len
        } else {
            u32::from(self.stop).min(len)
        };
        let start = u32::from(self.start).min(stop);
        start..stop
    }

    /// Pack into one word: `start` in the low half, `stop` in the high half
    pub const fn pack(self) -> u32 {
        (self.start as u32) | ((self.stop as u32) << 16)
    }

    /// Inverse of [`pack`](Self::pack)
    pub const fn unpack(word: u32) -> Self {
        Self {
            start: (word & 0xFFFF) as u16,
            stop: (word >> 16) as u16,
        }
    }

    fn counter(value: u32) -> u16 {
        assert!(
            value <= CAPACITY_CEILING,
            "primitive count {value} exceeds the batch ceiling of {CAPACITY_CEILING}"
        );
        value as u16
    }
}
