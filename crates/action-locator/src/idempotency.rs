use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

pub const DEFAULT_IDEMPOTENCY_CAPACITY: usize = 10_000;

/// Bounded set of feedback keys already applied. The oldest key is forgotten
/// once the capacity is exceeded.
#[derive(Debug)]
pub struct IdempotencyTracker {
    inner: Mutex<TrackerInner>,
}

#[derive(Debug)]
struct TrackerInner {
    capacity: usize,
    order: VecDeque<String>,
    keys: HashSet<String>,
}

impl Default for IdempotencyTracker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_IDEMPOTENCY_CAPACITY)
    }
}

impl IdempotencyTracker {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(TrackerInner {
                capacity,
                order: VecDeque::with_capacity(capacity.min(1_048_576)),
                keys: HashSet::with_capacity(capacity.min(1_048_576)),
            }),
        }
    }

    /// Returns true if the key is newly accepted.
    pub fn accept(&self, key: &str) -> bool {
        let mut guard = self.inner.lock();
        if guard.keys.contains(key) {
            return false;
        }
        guard.keys.insert(key.to_owned());
        guard.order.push_back(key.to_owned());
        while guard.order.len() > guard.capacity {
            if let Some(old) = guard.order.pop_front() {
                guard.keys.remove(&old);
            }
        }
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
