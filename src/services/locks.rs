//! Per-document exclusion for compound lending operations

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per document id. Every lookup-then-mutate sequence on a
/// document runs while holding its guard.
#[derive(Clone, Default)]
pub struct DocumentLocks {
    locks: Arc<Mutex<HashMap<i32, Arc<AsyncMutex<()>>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, document_id: i32) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // drop idle locks so the map tracks only documents in use
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(document_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
