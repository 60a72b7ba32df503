//! Per-content exclusion.
//!
//! Download and delete for the same id must not interleave. Each id gets
//! an async mutex on first use; the entry is dropped again once nobody
//! holds or waits on it.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct IdLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one state-changing operation on an id.
pub struct IdGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    id: String,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other operation holds `id`, then hold it.
    pub async fn acquire(&self, id: &str) -> IdGuard {
        let lock = self
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        IdGuard {
            guard: Some(guard),
            locks: self.locks.clone(),
            id: id.to_string(),
        }
    }

    /// Ids with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for IdGuard {
    fn drop(&mut self) {
        // Release first so the strong count below only sees waiters.
        drop(self.guard.take());
        // The map's own reference is the only one left when nobody waits.
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
