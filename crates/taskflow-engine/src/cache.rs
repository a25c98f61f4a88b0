//! LRU caches keyed by task-set fingerprint.
//!
//! A fingerprint is `strategy|id:rank:deps|id:rank:deps|...` with the id
//! segments sorted, so it is order-independent over the task set. Readers
//! observe whole values only: entries are `Arc`ed and the map sits behind a
//! mutex, so a concurrent reader sees either the previous value or the fully
//! populated one.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;

/// Mutex-guarded LRU of shared values keyed by fingerprint
pub struct FingerprintCache<T> {
    inner: Mutex<LruCache<String, Arc<T>>>,
    capacity: usize,
}

impl<T> FingerprintCache<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("capacity is at least 1"),
            )),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<T>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.lock().get(key).cloned()
    }

    pub fn put(&self, key: String, value: Arc<T>) {
        self.lock().put(key, value);
    }

    /// Drop every entry whose fingerprint contains the task id.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_task(&self, task_id: &str) -> usize {
        let mut guard = self.lock();
        let stale: Vec<String> = guard
            .iter()
            .filter(|(key, _)| fingerprint_contains_task(key, task_id))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            guard.pop(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<T> std::fmt::Debug for FingerprintCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// True when one of the key's `id:rank:deps` segments names the task
pub(crate) fn fingerprint_contains_task(key: &str, task_id: &str) -> bool {
    key.split('|')
        .skip(1)
        .any(|segment| segment.split(':').next() == Some(task_id))
}
