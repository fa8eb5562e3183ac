use thiserror::Error;

use crate::model::{ConflictResult, Id, Ms};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("resource set must not be empty")]
    EmptyResourceSet,
    #[error("invalid time range: end ({end}) must be after start ({start})")]
    InvalidRange { start: Ms, end: Ms },
    #[error("invalid entry: {0}")]
    InvalidEntry(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("not found: {kind} {id}")]
    NotFound { kind: &'static str, id: Id },
    #[error("{} overlapping entries at commit", .0.len())]
    Overlap(Vec<ConflictResult>),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl EngineError {
    /// Caller-side input problems, as opposed to store failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::EmptyResourceSet
                | EngineError::InvalidRange { .. }
                | EngineError::InvalidEntry(_)
                | EngineError::LimitExceeded(_)
                | EngineError::NotFound { .. }
        )
    }
}
