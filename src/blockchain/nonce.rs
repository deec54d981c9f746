//! Per-(wallet, chain) serialization of nonce-consuming operations.
//!
//! The platform hands out nonces; two concurrent submissions for the same
//! wallet and chain would otherwise read the same value. Holding the guard
//! from nonce fetch through acknowledgement serializes them within this
//! process. Unrelated wallets never contend.
//!
//! Entries live only while a guard is held or awaited, so the map is bounded
//! by the number of in-flight submissions.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::blockchain::types::ChainId;

type LockKey = (Uuid, ChainId);
type LockMap = DashMap<LockKey, Arc<Mutex<()>>>;

#[derive(Debug, Default)]
pub struct NonceLocks {
    locks: Arc<LockMap>,
}

impl NonceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of the nonce sequence of `wallet_id` on `chain_id`.
    pub async fn acquire(&self, wallet_id: Uuid, chain_id: ChainId) -> NonceGuard {
        let key = (wallet_id, chain_id);
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        NonceGuard {
            guard: Some(lock.lock_owned().await),
            locks: self.locks.clone(),
            key,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive hold on one nonce sequence. Owned, so it can move into the task
/// that finishes a broadcast.
#[derive(Debug)]
pub struct NonceGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
    key: LockKey,
}

impl Drop for NonceGuard {
    fn drop(&mut self) {
        // Unlock first. The entry goes only when no other holder or waiter
        // still has a clone of the mutex; cloning happens under the same
        // shard lock as this check.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
