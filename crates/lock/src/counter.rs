//! Shared per-transaction conflict counter
//!
//! One counter exists per transaction and is shared by reference (an
//! `Arc<Counter>`) among every lock record the transaction holds, across
//! both the per-key queues and the range tree. A transaction is runnable
//! exactly when its counter reads zero.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// A non-negative conflict count.
///
/// All mutation happens on the single thread that owns the lock manager;
/// the atomic exists only so monitoring paths may read the count from other
/// threads. `Relaxed` ordering carries no synchronization contract.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicU32,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// Add one conflict unit.
    pub fn acquire(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` conflict units.
    pub fn acquire_n(&self, n: u32) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Remove one conflict unit. Releasing a free counter is a bug in the
    /// conflict accounting and panics.
    pub fn release(&self) {
        if self.count.load(Ordering::Relaxed) == 0 {
            panic!("decrementing a zero conflict counter");
        }
        self.count.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn is_free(&self) -> bool {
        self.count.load(Ordering::Relaxed) == 0
    }

    /// Current count, for observation only.
    pub fn value(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release() {
        let counter = Counter::new();
        assert!(counter.is_free());
        counter.acquire();
        counter.acquire_n(2);
        assert!(!counter.is_free());
        assert_eq!(counter.value(), 3);
        counter.release();
        counter.release();
        counter.release();
        assert!(counter.is_free());
    }

    #[test]
    fn test_acquire_zero_is_noop() {
        let counter = Counter::new();
        counter.acquire_n(0);
        assert!(counter.is_free());
    }

    #[test]
    #[should_panic(expected = "zero conflict counter")]
    fn test_release_on_zero_panics() {
        Counter::new().release();
    }
}
