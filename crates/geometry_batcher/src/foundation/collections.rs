//! Specialized collection types

/// Free list of small integer indices
///
/// Hands out the lowest never-used index when nothing has been released,
/// otherwise the most recently released one.
#[derive(Debug, Default)]
pub struct IndexPool {
    next_unused: u32,
    free_indices: Vec<u32>,
}

impl IndexPool {
    /// Create a new, empty index pool
    pub fn new() -> Self {
        Self {
            next_unused: 0,
            free_indices: Vec::new(),
        }
    }

    /// Take an index out of the pool
    pub fn acquire(&mut self) -> u32 {
        if let Some(index) = self.free_indices.pop() {
            index
        } else {
            let index = self.next_unused;
            self.next_unused = self
                .next_unused
                .checked_add(1)
                .expect("index pool exhausted the u32 range");
            index
        }
    }

    /// Return an index to the pool
    ///
    /// # Panics
    ///
    /// Panics if `index` was never handed out.
    pub fn release(&mut self, index: u32) {
        assert!(
            index < self.next_unused,
            "released index {index} was never acquired"
        );
        debug_assert!(
            !self.free_indices.contains(&index),
            "index {index} released twice"
        );
        self.free_indices.push(index);
    }

    /// Number of indices currently handed out
    pub fn live_count(&self) -> usize {
        self.next_unused as usize - self.free_indices.len()
    }

    /// Highest number of indices ever handed out at once
    pub fn high_water_mark(&self) -> u32 {
        self.next_unused
    }
}
