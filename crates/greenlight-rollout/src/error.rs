use thiserror::Error;

use greenlight_core::{ConfigError, RunId};

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("rollout already in progress for run {0}")]
    AlreadyInProgress(RunId),

    #[error("rollout controller is shutting down")]
    ShuttingDown,

    #[error("invalid rollout configuration: {0}")]
    Config(#[from] ConfigError),
}

pub type RolloutResult<T> = Result<T, RolloutError>;

/// A deployment backend hook did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {reason}")]
pub struct BackendError {
    pub operation: &'static str,
    pub reason: String,
}

impl BackendError {
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}
