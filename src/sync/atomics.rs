//! Atomic helpers for pipeline statistics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A monotonically increasing event counter.
#[derive(Debug)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create a new counter.
    pub const fn new(initial: u64) -> Self {
        Self(AtomicU64::new(initial))
    }

    /// Increment the counter.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Current depth of a queue plus its high-water mark.
#[derive(Debug, Default)]
pub struct DepthGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl DepthGauge {
    /// Record one more queued item and update the peak.
    pub fn push(&self) -> usize {
        let depth = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.update_peak(depth);
        depth
    }

    /// Record one item leaving the queue.
    pub fn pop(&self) -> usize {
        // Saturate so a racing reader never observes a wrapped value.
        let mut current = self.current.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(1);
            match self.current.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Current depth.
    pub fn get(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    /// Highest depth observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    fn update_peak(&self, value: usize) {
        let mut current = self.peak.load(Ordering::Relaxed);
        while value > current {
            match self.peak.compare_exchange_weak(
                current,
                value,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
    }
}
