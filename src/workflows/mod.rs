// Workflow state model and the pure rules that drive it

pub mod completion;
pub mod state_machine;
pub mod status;
pub mod types;

pub use completion::{evaluate, CompletionOutcome, LOAN_DECISION_NOT_SET};
pub use state_machine::{TransitionError, WorkflowStateName};
pub use status::{determine_status, AggregationError};
pub use types::{
    AttributeDecision, DecisionValue, ExecutionStatus, LoanStatus, ParseValueError, ReviewType,
    TransitionEntry, WorkflowKey, WorkflowRecord, SYSTEM_USER,
};
