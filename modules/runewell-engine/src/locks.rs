//! Per-user serialization.
//!
//! One async mutex per user id, created on demand and dropped once nobody
//! holds or waits on it. Different users never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct UserLocks {
    entries: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`.
    pub async fn lock(&self, user_id: &str) -> UserGuard<'_> {
        let mutex = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.entry(user_id.to_string()).or_default().clone()
        };
        let guard = mutex.clone().lock_owned().await;
        UserGuard {
            locks: self,
            user_id: user_id.to_string(),
            mutex,
            guard: Some(guard),
        }
    }

    /// Users with a live lock entry.
    pub fn active(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: String,
    mutex: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut entries = self
            .locks
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map and this guard hold the only references: no waiters.
        if Arc::strong_count(&self.mutex) == 2 {
            entries.remove(&self.user_id);
        }
    }
}
