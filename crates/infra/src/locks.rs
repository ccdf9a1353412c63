//! Per-key serialization for decisions.
//!
//! Deciding a usage request or finalizing a batch order touches two
//! aggregates (the request/order and one or more items). The optimistic
//! append on the request/order would reject a second decision, but only
//! after the ledger was already reconciled. Holding a lock keyed by the
//! request/order id for the whole decision keeps concurrent deciders from
//! both reaching the ledger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use labstock_core::AggregateId;

#[derive(Debug, Default)]
pub struct DecisionLocks {
    locks: Mutex<HashMap<AggregateId, Arc<Mutex<()>>>>,
}

impl DecisionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<T>(&self, key: AggregateId, f: impl FnOnce() -> T) -> T {
        let lock = self.acquire(key);
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f()
        };
        self.release(key, lock);
        result
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn acquire(&self, key: AggregateId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key).or_default().clone()
    }

    fn release(&self, key: AggregateId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the map and this caller still hold it.
        if Arc::strong_count(&lock) == 2 {
            if let Some(existing) = locks.get(&key) {
                if Arc::ptr_eq(existing, &lock) {
                    locks.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn same_key_is_serialized() {
        let locks = Arc::new(DecisionLocks::new());
        let key = AggregateId::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    locks.with_lock(key, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn returns_the_closure_result() {
        let locks = DecisionLocks::new();
        assert_eq!(locks.with_lock(AggregateId::new(), || 42), 42);
        assert!(locks.is_empty());
    }
}
