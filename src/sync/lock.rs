//! Per-profile single-flight locks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::ProfileId;

/// Serializes sync runs per profile. Different profiles never contend.
#[derive(Debug, Default)]
pub struct SyncLocks {
    locks: DashMap<ProfileId, Arc<Mutex<()>>>,
}

impl SyncLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other run holds `profile`, then hold it until the guard drops.
    pub async fn acquire(&self, profile: ProfileId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held across the await.
        let lock = self.locks.entry(profile).or_default().value().clone();
        lock.lock_owned().await
    }

    pub fn is_locked(&self, profile: ProfileId) -> bool {
        self.locks
            .get(&profile)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Drop the lock entry for a deleted profile.
    pub fn forget(&self, profile: ProfileId) {
        self.locks.remove(&profile);
    }
}
