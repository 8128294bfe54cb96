//! Per-translation-id write serialization.
//!
//! Two interleaved merges for the same id would each read a possibly
//! stale snapshot, compute independent merges, and the later write-back
//! would silently discard the other's verse additions. Holding a per-id
//! lock across the whole read-merge-write sequence closes that race; the
//! scope is one id, so merges for different translations still proceed
//! concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub(crate) struct IdLocks {
    // Entries are never removed: the set of translation ids in a process
    // lifetime is small (a handful of editions), matching the unbounded
    // L1 map.
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdLocks {
    /// Acquire the lock for one translation id, creating it on first use.
    pub(crate) async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}
