use thiserror::Error;

use crate::callback::CallbackError;
use crate::orchestration::OrchestrationError;
use crate::persistence::PersistenceError;
use crate::workflows::{AggregationError, ParseValueError, TransitionError, WorkflowKey};

/// Errors surfaced by review operations
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Workflow state not found for request {}, loan {}", .0.request_number, .0.loan_number)]
    NotFound(WorkflowKey),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("An active review already exists for request {}, loan {}", .0.request_number, .0.loan_number)]
    AlreadyActive(WorkflowKey),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Failed to resume workflow execution: {0}")]
    ResumeFailed(#[source] OrchestrationError),

    #[error("Workflow engine error: {0}")]
    Orchestration(#[from] OrchestrationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl From<ParseValueError> for ReviewError {
    fn from(err: ParseValueError) -> Self {
        ReviewError::Validation(err.to_string())
    }
}

impl ReviewError {
    /// Input was rejected before anything was mutated
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReviewError::Validation(_) | ReviewError::InvalidTransition(_) | ReviewError::AlreadyActive(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReviewError::NotFound(_))
    }
}
