//! ProgressionStore implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use runewell_common::{RankDefinition, StoreError, UserProgression};
use runewell_store::{PgProgressionStore, Versioned};

use crate::traits::ProgressionStore;

// ---------------------------------------------------------------------------
// PgProgressionStore adapter (production, postgres)
// ---------------------------------------------------------------------------

#[async_trait]
impl ProgressionStore for PgProgressionStore {
    async fn load(&self, user_id: &str) -> Result<Versioned<UserProgression>, StoreError> {
        PgProgressionStore::load(self, user_id).await
    }

    async fn commit(
        &self,
        progression: &UserProgression,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        PgProgressionStore::commit(self, progression, expected_version).await
    }

    async fn list_ranks(&self) -> Result<Vec<RankDefinition>, StoreError> {
        PgProgressionStore::list_ranks(self).await
    }
}

// ---------------------------------------------------------------------------
// MemoryProgressionStore (tests and local runs, no database)
// ---------------------------------------------------------------------------

/// In-memory store with the same compare-and-swap semantics as Postgres.
/// Thread-safe. Can inject commit failures and lost races for tests.
pub struct MemoryProgressionStore {
    users: Mutex<HashMap<String, Versioned<UserProgression>>>,
    ranks: Mutex<Vec<RankDefinition>>,
    failing_commits: AtomicU32,
    conflicting_commits: AtomicU32,
    commits: AtomicU64,
}

impl Default for MemoryProgressionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProgressionStore {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            ranks: Mutex::new(Vec::new()),
            failing_commits: AtomicU32::new(0),
            conflicting_commits: AtomicU32::new(0),
            commits: AtomicU64::new(0),
        }
    }

    pub fn with_ranks(self, ranks: Vec<RankDefinition>) -> Self {
        self.set_ranks(ranks);
        self
    }

    /// Replace the rank catalog, as an admin edit would.
    pub fn set_ranks(&self, ranks: Vec<RankDefinition>) {
        *lock(&self.ranks) = ranks;
    }

    /// Seed a user's state directly, bypassing the engine (tests, imports).
    pub fn seed(&self, progression: UserProgression) {
        let mut users = lock(&self.users);
        let version = users
            .get(&progression.user_id)
            .map(|v| v.version + 1)
            .unwrap_or(1);
        users.insert(progression.user_id.clone(), Versioned::new(version, progression));
    }

    /// The next `n` commits fail with `StoreError::Unavailable`.
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// The next `n` commits lose a race: another writer bumps the stored
    /// version first, so the commit reports a conflict.
    pub fn conflict_next_commits(&self, n: u32) {
        self.conflicting_commits.store(n, Ordering::SeqCst);
    }

    /// Number of successful commits (for test assertions).
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn version_of(&self, user_id: &str) -> u64 {
        lock(&self.users).get(user_id).map(|v| v.version).unwrap_or(0)
    }

    fn take_injected(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ProgressionStore for MemoryProgressionStore {
    async fn load(&self, user_id: &str) -> Result<Versioned<UserProgression>, StoreError> {
        Ok(lock(&self.users)
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Versioned::new(0, UserProgression::new(user_id))))
    }

    async fn commit(
        &self,
        progression: &UserProgression,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        if Self::take_injected(&self.failing_commits) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }

        let mut users = lock(&self.users);

        if Self::take_injected(&self.conflicting_commits) {
            let entry = users
                .entry(progression.user_id.clone())
                .or_insert_with(|| Versioned::new(0, UserProgression::new(&progression.user_id)));
            entry.version += 1;
        }

        let found = users
            .get(&progression.user_id)
            .map(|v| v.version)
            .unwrap_or(0);
        if found != expected_version {
            return Err(StoreError::Conflict {
                user_id: progression.user_id.clone(),
                expected: expected_version,
                found,
            });
        }

        let next_version = expected_version + 1;
        users.insert(
            progression.user_id.clone(),
            Versioned::new(next_version, progression.clone()),
        );
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(next_version)
    }

    async fn list_ranks(&self) -> Result<Vec<RankDefinition>, StoreError> {
        Ok(lock(&self.ranks).clone())
    }
}

// ---------------------------------------------------------------------------
// Arc<P> blanket: tests share the store for assertions
// ---------------------------------------------------------------------------

#[async_trait]
impl<P: ProgressionStore + ?Sized> ProgressionStore for Arc<P> {
    async fn load(&self, user_id: &str) -> Result<Versioned<UserProgression>, StoreError> {
        (**self).load(user_id).await
    }

    async fn commit(
        &self,
        progression: &UserProgression,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        (**self).commit(progression, expected_version).await
    }

    async fn list_ranks(&self) -> Result<Vec<RankDefinition>, StoreError> {
        (**self).list_ranks().await
    }
}
