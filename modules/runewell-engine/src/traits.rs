//! Repository seam between the coordinator and persistence.

use async_trait::async_trait;
use runewell_common::{RankDefinition, StoreError, UserProgression};
use runewell_store::Versioned;

/// Loads and commits progression aggregates with optimistic versioning.
///
/// Implemented by PgProgressionStore (postgres) and MemoryProgressionStore
/// (tests, local runs). Also implemented for `Arc<P>` so a store can be shared.
#[async_trait]
pub trait ProgressionStore: Send + Sync {
    /// Current aggregate and its version. Unknown users load empty at version 0.
    async fn load(&self, user_id: &str) -> Result<Versioned<UserProgression>, StoreError>;

    /// Replace the aggregate if the stored version still equals
    /// `expected_version`; otherwise fail with `StoreError::Conflict` and
    /// write nothing. Returns the new version.
    async fn commit(
        &self,
        progression: &UserProgression,
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    /// Snapshot of the rank catalog in insertion order.
    async fn list_ranks(&self) -> Result<Vec<RankDefinition>, StoreError>;
}
