//! Concurrency-safe fetch attempt counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counts fetch attempts, successful or not.
///
/// Reset at the start of every cycle; the reporting side reads it without
/// resetting. All operations are lock-free.
#[derive(Debug, Default)]
pub struct AttemptCounter {
    attempts: AtomicU64,
}

impl AttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fetch attempt.
    pub fn increment(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value, without resetting.
    pub fn read(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Atomically return the current value and set it to 0.
    pub fn read_and_reset(&self) -> u64 {
        self.attempts.swap(0, Ordering::Relaxed)
    }
}
