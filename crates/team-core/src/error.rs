//! Engine-level error taxonomy.

use thiserror::Error;

/// Errors surfaced by the scheduler, role executor, and engine loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job {job_id} not found")]
    NotFound { job_id: String },

    #[error("action not valid in current state: {reason}")]
    InvalidState { reason: String },

    #[error(transparent)]
    Store(#[from] team_store::StoreError),

    #[error("agent output failed {role} schema validation: {reason}")]
    RoleSchemaError { role: String, reason: String },

    #[error("agent exec failed ({kind}): {reason}")]
    AgentExecFailed { kind: FailureKind, reason: String },

    #[error("no runnable tasks and no recovery path available")]
    DeadlockExhausted,

    #[error("team run loop timed out while waiting for task progress")]
    TimeoutIdle,
}

/// Classification used to decide retry policy for an agent exec failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimit,
    General,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => f.write_str("rate_limit"),
            Self::General => f.write_str("general"),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
