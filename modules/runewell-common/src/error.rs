use thiserror::Error;

use crate::types::MetricKey;

/// Persistence failures. Nothing is committed when one of these is returned.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("version conflict for user {user_id}: expected {expected}, found {found}")]
    Conflict {
        user_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Misuse of a metric: a counter op on a set-backed key or the reverse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    #[error("{0} is set-backed and cannot be incremented")]
    NotACounter(MetricKey),

    #[error("{0} is counter-backed and has no interaction set")]
    NotASet(MetricKey),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("duplicate badge id: {0}")]
    DuplicateBadgeId(String),

    #[error("badge {0} has a zero target")]
    ZeroTarget(String),

    #[error("duplicate rank id: {0}")]
    DuplicateRankId(String),

    #[error(transparent)]
    Load(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ProgressionError {
    #[error("unknown metric key or action type: {0}")]
    UnknownMetricKey(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("concurrent update for user {user_id}: expected version {expected}, found {found}")]
    ConcurrencyConflict {
        user_id: String,
        expected: u64,
        found: u64,
    },

    #[error("progression for user {user_id} not committed after {attempts} attempts")]
    TransientFailure { user_id: String, attempts: u32 },

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error("Storage failure: {0}")]
    Storage(StoreError),

    #[error("progression task aborted: {0}")]
    Aborted(String),
}

impl From<StoreError> for ProgressionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                user_id,
                expected,
                found,
            } => ProgressionError::ConcurrencyConflict {
                user_id,
                expected,
                found,
            },
            other => ProgressionError::Storage(other),
        }
    }
}

impl ProgressionError {
    /// Whether the caller may resubmit the same event. Retries are safe because
    /// set-backed events deduplicate.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProgressionError::ConcurrencyConflict { .. }
                | ProgressionError::TransientFailure { .. }
                | ProgressionError::Storage(_)
                | ProgressionError::Aborted(_)
        )
    }
}
