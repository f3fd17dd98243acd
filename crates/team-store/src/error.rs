//! Error taxonomy for the store layer.

use thiserror::Error;

/// Errors surfaced by job, event, and queue persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {job_id} not found")]
    NotFound { job_id: String },

    #[error("timed out waiting for lock on job {job_id}")]
    LockTimeout { job_id: String },

    #[error("record for job {job_id} is corrupt: {reason}")]
    CorruptRecord { job_id: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias used throughout the store crate.
pub type StoreResult<T> = Result<T, StoreError>;
