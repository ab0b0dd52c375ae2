//! Global lookup budget shared by all workers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Remaining lookups for a run. A limit of 0 means unbounded.
#[derive(Debug)]
pub struct Budget {
    remaining: AtomicU64,
    unbounded: bool,
}

impl Budget {
    pub fn new(limit: u64) -> Self {
        Self {
            remaining: AtomicU64::new(limit),
            unbounded: limit == 0,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.unbounded
    }

    /// Reserve one lookup. Returns `false` once the budget is spent; the
    /// worker that sees `false` stops.
    pub fn try_acquire(&self) -> bool {
        if self.unbounded {
            return true;
        }
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self) -> Option<u64> {
        (!self.unbounded).then(|| self.remaining.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn never_hands_out_more_than_the_limit() {
        let budget = Arc::new(Budget::new(1_000));
        let granted = Arc::new(AtomicU64::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let budget = Arc::clone(&budget);
                let granted = Arc::clone(&granted);
                thread::spawn(move || {
                    while budget.try_acquire() {
                        granted.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(granted.load(Ordering::Relaxed), 1_000);
        assert_eq!(budget.remaining(), Some(0));
        assert!(!budget.try_acquire());
    }

    #[test]
    fn zero_limit_is_unbounded() {
        let budget = Budget::new(0);
        assert!(budget.is_unbounded());
        assert!((0..10_000).all(|_| budget.try_acquire()));
        assert_eq!(budget.remaining(), None);
    }
}
