//! Per-task and per-user serialization.
//!
//! | Primitive | Scope | Contended behaviour |
//! |-----------|-------|---------------------|
//! | [`InFlight`] | one aggregation per task | second caller fails fast |
//! | [`KeyedLocks`] | task state, user scores | caller waits |
//!
//! Both are keyed maps, so unrelated tasks and unrelated users never
//! contend with each other.
//!
//! Entries exist only while a key is in use: a [`KeyedLocks`] mutex is
//! evicted once its last holder or waiter lets go, so the maps stay
//! bounded by the number of concurrently active keys.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::{DashMap, DashSet};

/// Set of keys with an operation currently running.
#[derive(Debug, Default)]
pub struct InFlight {
    active: DashSet<String>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as running, or returns `None` if it already is.
    ///
    /// The mark is cleared when the returned guard drops.
    pub fn try_acquire(&self, key: &str) -> Option<InFlightGuard<'_>> {
        if self.active.insert(key.to_string()) {
            Some(InFlightGuard {
                set: self,
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.active.contains(key)
    }
}

/// Clears an [`InFlight`] mark on drop.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    set: &'a InFlight,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.active.remove(&self.key);
    }
}

/// One mutex per key, created on first use and evicted when idle.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        // Clone the Arc out so the shard lock is released before blocking.
        Arc::clone(self.locks.entry(key.to_string()).or_default().value())
    }

    /// Runs `f` while holding the lock for `key`.
    pub fn with<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(key);
        let out = {
            let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(lock);
        // Only the map's own reference left: no holder, no waiter.
        self.locks.remove_if(key, |_, l| Arc::strong_count(l) == 1);
        out
    }

    /// Number of keys with a live mutex.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
