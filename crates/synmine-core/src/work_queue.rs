//! Lock-free work queue for distributing units across parallel workers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Lock-free work queue distributing items to workers in their original order.
///
/// Workers call [`next()`](WorkQueue::next) to atomically claim the next item
/// together with its position. [`halt()`](WorkQueue::halt) stops handing out
/// items; already-claimed items are unaffected.
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
    halted: AtomicBool,
}

impl<S> WorkQueue<S> {
    pub fn new(items: Vec<S>) -> Self {
        log::debug!("{} items in work queue", items.len());
        Self {
            items,
            cursor: AtomicUsize::new(0),
            halted: AtomicBool::new(false),
        }
    }

    /// Claim the next item and its index (lock-free)
    pub fn next(&self) -> Option<(usize, &S)> {
        if self.halted.load(Ordering::Acquire) {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i).map(|s| (i, s))
    }

    /// Stop handing out items
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Total items in queue
    pub fn total(&self) -> usize {
        self.items.len()
    }
}
