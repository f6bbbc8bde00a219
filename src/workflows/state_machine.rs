// Workflow state machine
// Transitions are driven by external events; this table only guards which moves are legal.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid workflow transition from {from} to {to}")]
    InvalidTransition {
        from: WorkflowStateName,
        to: WorkflowStateName,
    },

    #[error("Workflow already reached terminal state {0}")]
    Terminal(WorkflowStateName),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStateName {
    ValidateReviewType,
    CompletionCriteriaMet,
    LoanDecisionUpdate,
    WorkflowComplete,
}

impl WorkflowStateName {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStateName::ValidateReviewType => "ValidateReviewType",
            WorkflowStateName::CompletionCriteriaMet => "CompletionCriteriaMet",
            WorkflowStateName::LoanDecisionUpdate => "LoanDecisionUpdate",
            WorkflowStateName::WorkflowComplete => "WorkflowComplete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStateName::WorkflowComplete)
    }

    /// States reachable from `self`. Re-entering a non-terminal state is allowed so
    /// repeated updates and re-evaluations are each logged.
    pub fn allowed_targets(&self) -> &'static [WorkflowStateName] {
        use WorkflowStateName::*;
        match self {
            ValidateReviewType => &[ValidateReviewType, LoanDecisionUpdate, CompletionCriteriaMet],
            LoanDecisionUpdate => &[LoanDecisionUpdate, ValidateReviewType, CompletionCriteriaMet],
            CompletionCriteriaMet => &[CompletionCriteriaMet, LoanDecisionUpdate, WorkflowComplete],
            WorkflowComplete => &[],
        }
    }

    pub fn can_transition_to(&self, to: WorkflowStateName) -> bool {
        self.allowed_targets().contains(&to)
    }

    pub fn check_transition(&self, to: WorkflowStateName) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::Terminal(*self));
        }
        if !self.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition { from: *self, to });
        }
        Ok(())
    }
}

impl fmt::Display for WorkflowStateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
