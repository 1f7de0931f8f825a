//! Domain error taxonomy, converted into HTTP responses at the API boundary
//! (see `api::ApiError`).

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SupervisorError {
    #[error("worker not found: {0}")]
    NotFound(String),

    #[error("unsupported worker type: {0}")]
    UnsupportedType(String),

    #[error("preflight check failed for {id}: {reason}")]
    PreflightFailure { id: String, reason: String },

    #[error("failed to spawn worker {id}: {reason}")]
    SpawnFailure { id: String, reason: String },

    #[error("transient runtime failure for {id}: {reason}")]
    TransientRuntimeFailure { id: String, reason: String },

    #[error("failed to parse config: {0}")]
    ParseFailure(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
