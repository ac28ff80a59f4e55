use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Global fingerprint -> mutex table. Acquisition is FIFO per key because
/// it is backed by `tokio::sync::Mutex`, which queues waiters in arrival
/// order. Holders are only supposed to do I/O to create a work
/// directory, per the coordination algorithm in `coordinate.rs`.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, fingerprint_hex: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(fingerprint_hex.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }
}
