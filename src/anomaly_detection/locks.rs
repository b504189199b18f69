//! Per-profile writer serialization
//!
//! Every read-modify-write of a `(user, category)` profile runs while that
//! key's async mutex is held, so concurrent confirmations and rebuilds for
//! the same key cannot lose each other's updates.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::anomaly_detection::profile::ProfileKey;

/// Idle entries are swept once the table grows past this size
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct ProfileLocks {
    inner: Mutex<HashMap<ProfileKey, Arc<AsyncMutex<()>>>>,
}

impl ProfileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`; released when the guard drops
    pub async fn acquire(&self, key: &ProfileKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.inner.lock();
            if table.len() >= PRUNE_THRESHOLD {
                // only the table itself holds an idle entry
                table.retain(|_, l| Arc::strong_count(l) > 1);
            }
            table.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn tracked_keys(&self) -> usize {
        self.inner.lock().len()
    }
}
