//! Pipeline error types.

use thiserror::Error;

use greenlight_core::{DescriptorError, TriggerError};
use greenlight_state::StateError;

/// Why a stage did not produce its required output.
///
/// The engine records every variant as a failed stage; the variant and its
/// message are kept for diagnostics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageFailure {
    #[error("build failed: {0}")]
    Build(String),

    #[error("tests failed: {0}")]
    Test(String),

    /// The external service could not be reached or refused the call.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// An input artifact was missing, corrupt, or of an unsupported schema.
    #[error("artifact error: {0}")]
    Artifact(String),

    /// The deploy stage ended in `RolledBack` or `Failed`.
    #[error("{0}")]
    Rollout(String),
}

impl From<StateError> for StageFailure {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(_) | StateError::Corrupt(_) | StateError::Conflict(_) => {
                StageFailure::Artifact(e.to_string())
            }
            other => StageFailure::Infrastructure(other.to_string()),
        }
    }
}

impl From<DescriptorError> for StageFailure {
    fn from(e: DescriptorError) -> Self {
        StageFailure::Artifact(e.to_string())
    }
}

/// Errors surfaced by the engine and trigger queue themselves.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid trigger: {0}")]
    Trigger(#[from] TriggerError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("trigger queue is full ({0} runs pending)")]
    QueueFull(usize),

    #[error("run not found: {0}")]
    RunNotFound(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
