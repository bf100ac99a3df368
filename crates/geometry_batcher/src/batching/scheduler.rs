//! Flush Scheduler
//!
//! Single-consumer FIFO of deferred work. Any thread may enqueue; only the
//! consumer thread takes items out, always the whole queue at once so that a
//! [`WorkItem::Notify`] runs after everything enqueued before it.

use super::batch::SealedBatch;
use super::slots::RendererSlot;
use crate::foundation::sync::lock;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Completion signal invoked on the consumer thread
pub type FlushCallback = Box<dyn FnOnce() + Send + 'static>;

/// Deferred work executed by the consumer thread
pub enum WorkItem {
    /// Build a drawable from a sealed batch
    Materialize(Arc<SealedBatch>),
    /// Recompute one slot's visible index lists
    Refresh(RendererSlot),
    /// Signal that everything enqueued before has executed
    Notify(FlushCallback),
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Materialize(batch) => f.debug_tuple("Materialize").field(&batch.slot()).finish(),
            Self::Refresh(slot) => f.debug_tuple("Refresh").field(slot).finish(),
            Self::Notify(_) => f.write_str("Notify"),
        }
    }
}

/// Lock-protected queue of pending work
#[derive(Debug, Default)]
pub struct FlushScheduler {
    pending: Mutex<VecDeque<WorkItem>>,
}

impl FlushScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one item
    pub fn enqueue(&self, item: WorkItem) {
        lock(&self.pending).push_back(item);
    }

    /// Append several items in one critical section, keeping their order
    pub fn enqueue_all(&self, items: impl IntoIterator<Item = WorkItem>) {
        lock(&self.pending).extend(items);
    }

    /// Remove and return everything queued so far
    pub fn take_pending(&self) -> VecDeque<WorkItem> {
        std::mem::take(&mut *lock(&self.pending))
    }

    /// Execute everything queued so far, in order; returns how many items ran
    ///
    /// Items enqueued while the drain runs wait for the next drain.
    pub fn drain(&self, mut execute: impl FnMut(WorkItem)) -> usize {
        let items = self.take_pending();
        let count = items.len();
        items.into_iter().for_each(&mut execute);
        count
    }

    /// Number of queued items
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.pending_len() == 0
    }
}
