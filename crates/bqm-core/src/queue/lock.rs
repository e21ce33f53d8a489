//! Exclusive-access wrapper for a shared queue.
//!
//! The queue has no internal locking; every operation requires the caller
//! to hold exclusive access. Reaching a shared queue only through this
//! handle makes that contract explicit instead of conventional.

use std::sync::{Mutex, MutexGuard};

use super::registry::BundleQueue;

pub struct QueueLock {
    inner: Mutex<BundleQueue>,
}

impl QueueLock {
    pub fn new(queue: BundleQueue) -> Self {
        Self {
            inner: Mutex::new(queue),
        }
    }

    /// Blocks until exclusive access is available. All registry calls go
    /// through the returned guard.
    pub fn lock(&self) -> MutexGuard<'_, BundleQueue> {
        self.inner.lock().unwrap()
    }

    pub fn into_inner(self) -> BundleQueue {
        self.inner.into_inner().unwrap()
    }
}
