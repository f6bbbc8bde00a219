// Workflow record model
// One record per (request number, loan number); the pair is the natural key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::state_machine::{TransitionError, WorkflowStateName};

/// Actor id recorded when the workflow engine, not a person, drives a change
pub const SYSTEM_USER: &str = "System";

/// Decision assigned to a freshly started review
pub const INITIAL_LOAN_DECISION: &str = "Pending Review";

pub const STAGE_REVIEW_INITIATED: &str = "Review Initiated";
pub const STAGE_WAITING_FOR_DECISION: &str = "Waiting for Loan Decision";
pub const STAGE_WAITING_FOR_RECLASS: &str = "Waiting for Reclass Confirmation";
pub const STAGE_DECISION_RECEIVED: &str = "Loan Decision Received";
pub const STAGE_STATUS_DETERMINED_PREFIX: &str = "Loan Status Determined: ";

pub const REVIEW_STEP_SYSTEM: &str = "System Process";
pub const REVIEW_STEP_COMPLETED: &str = "Workflow Completed";
pub const REVIEW_STEP_RECLASS_CONFIRMATION: &str = "Waiting Reclass Confirmation";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseValueError {
    #[error("Invalid review type: {0}. Allowed values: LDC, Sec Policy, Conduit")]
    ReviewType(String),

    #[error("Invalid attribute decision: {0}. Allowed values: Approved, Rejected, Reclass, Repurchase, Pending")]
    Decision(String),

    #[error("Invalid loan status: {0}")]
    LoanStatus(String),
}

/// Composite key of a workflow record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowKey {
    pub request_number: String,
    pub loan_number: String,
}

impl WorkflowKey {
    pub fn new(request_number: impl Into<String>, loan_number: impl Into<String>) -> Self {
        Self {
            request_number: request_number.into(),
            loan_number: loan_number.into(),
        }
    }
}

impl fmt::Display for WorkflowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.request_number, self.loan_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewType {
    #[serde(rename = "LDC")]
    Ldc,
    #[serde(rename = "Sec Policy")]
    SecPolicy,
    #[serde(rename = "Conduit")]
    Conduit,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::Ldc => "LDC",
            ReviewType::SecPolicy => "Sec Policy",
            ReviewType::Conduit => "Conduit",
        }
    }

    /// Human-facing review step label shown while this review type is active
    pub fn review_step(&self) -> &'static str {
        match self {
            ReviewType::Ldc => "LDC Review",
            ReviewType::SecPolicy => "Sec Policy Review",
            ReviewType::Conduit => "Conduit Review",
        }
    }
}

impl fmt::Display for ReviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewType {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LDC" => Ok(ReviewType::Ldc),
            "Sec Policy" => Ok(ReviewType::SecPolicy),
            "Conduit" => Ok(ReviewType::Conduit),
            other => Err(ParseValueError::ReviewType(other.to_string())),
        }
    }
}

/// Review step for an optional review type
pub fn review_step_for(review_type: Option<ReviewType>) -> &'static str {
    review_type
        .map(|t| t.review_step())
        .unwrap_or(REVIEW_STEP_SYSTEM)
}

/// Per-attribute decision value. `None` on an [`AttributeDecision`] means not yet evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionValue {
    Approved,
    Rejected,
    Reclass,
    Repurchase,
    Pending,
}

impl DecisionValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionValue::Approved => "Approved",
            DecisionValue::Rejected => "Rejected",
            DecisionValue::Reclass => "Reclass",
            DecisionValue::Repurchase => "Repurchase",
            DecisionValue::Pending => "Pending",
        }
    }
}

impl fmt::Display for DecisionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionValue {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Approved" => Ok(DecisionValue::Approved),
            "Rejected" => Ok(DecisionValue::Rejected),
            "Reclass" => Ok(DecisionValue::Reclass),
            "Repurchase" => Ok(DecisionValue::Repurchase),
            "Pending" => Ok(DecisionValue::Pending),
            other => Err(ParseValueError::Decision(other.to_string())),
        }
    }
}

/// Overall loan status produced by the status aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    Approved,
    Rejected,
    #[serde(rename = "Partially Approved")]
    PartiallyApproved,
    Repurchase,
    #[serde(rename = "Reclass Approved")]
    ReclassApproved,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Approved => "Approved",
            LoanStatus::Rejected => "Rejected",
            LoanStatus::PartiallyApproved => "Partially Approved",
            LoanStatus::Repurchase => "Repurchase",
            LoanStatus::ReclassApproved => "Reclass Approved",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Approved" => Ok(LoanStatus::Approved),
            "Rejected" => Ok(LoanStatus::Rejected),
            "Partially Approved" => Ok(LoanStatus::PartiallyApproved),
            "Repurchase" => Ok(LoanStatus::Repurchase),
            "Reclass Approved" => Ok(LoanStatus::ReclassApproved),
            other => Err(ParseValueError::LoanStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Completed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDecision {
    pub name: String,
    pub decision: Option<DecisionValue>,
}

impl AttributeDecision {
    pub fn new(name: impl Into<String>, decision: Option<DecisionValue>) -> Self {
        Self {
            name: name.into(),
            decision,
        }
    }

    pub fn pending(name: impl Into<String>) -> Self {
        Self::new(name, Some(DecisionValue::Pending))
    }

    /// True when the attribute still needs a reviewer decision
    pub fn is_undecided(&self) -> bool {
        matches!(self.decision, None | Some(DecisionValue::Pending))
    }
}

/// Immutable entry of the transition log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEntry {
    pub state_name: WorkflowStateName,
    pub actor_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Durable state of a single loan review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub request_number: String,
    pub loan_number: String,
    pub review_type: Option<ReviewType>,
    pub loan_decision: Option<String>,
    pub loan_status: Option<LoanStatus>,
    pub attributes: Vec<AttributeDecision>,
    pub workflow_state_name: WorkflowStateName,
    pub current_stage: String,
    status: ExecutionStatus,
    pub retry_count: u32,
    pub assigned_user_id: Option<String>,
    pub task_number: Option<u64>,
    pub execution_id: Option<String>,
    pub resume_token: Option<String>,
    pub is_reclass_confirmation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    transitions: Vec<TransitionEntry>,
}

impl WorkflowRecord {
    /// Fresh record in the initial state with every attribute pending and the
    /// initial transition already logged.
    pub fn new(key: WorkflowKey, review_type: Option<ReviewType>, actor_id: &str) -> Self {
        let now = Utc::now();
        let initial = WorkflowStateName::ValidateReviewType;
        Self {
            request_number: key.request_number,
            loan_number: key.loan_number,
            review_type,
            loan_decision: None,
            loan_status: None,
            attributes: Vec::new(),
            workflow_state_name: initial,
            current_stage: STAGE_REVIEW_INITIATED.to_string(),
            status: ExecutionStatus::Running,
            retry_count: 0,
            assigned_user_id: Some(actor_id.to_string()),
            task_number: None,
            execution_id: None,
            resume_token: None,
            is_reclass_confirmation: false,
            created_at: now,
            updated_at: now,
            transitions: vec![TransitionEntry {
                state_name: initial,
                actor_id: actor_id.to_string(),
                started_at: now,
                ended_at: now,
            }],
        }
    }

    pub fn key(&self) -> WorkflowKey {
        WorkflowKey::new(self.request_number.clone(), self.loan_number.clone())
    }

    pub fn transitions(&self) -> &[TransitionEntry] {
        &self.transitions
    }

    /// Execution status; only `mark_completed` moves it forward.
    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.workflow_state_name.is_terminal()
    }

    pub fn review_step(&self) -> &'static str {
        match self.status {
            ExecutionStatus::Completed => REVIEW_STEP_COMPLETED,
            ExecutionStatus::Running if self.is_reclass_confirmation => {
                REVIEW_STEP_RECLASS_CONFIRMATION
            }
            ExecutionStatus::Running => review_step_for(self.review_type),
        }
    }

    /// Move to `to`, appending a transition entry on behalf of `actor_id`.
    ///
    /// The record is left untouched when the transition is not allowed.
    pub fn advance(&mut self, to: WorkflowStateName, actor_id: &str) -> Result<(), TransitionError> {
        let from = self.workflow_state_name;
        from.check_transition(to)?;

        let now = Utc::now();
        let started_at = self
            .transitions
            .last()
            .map(|entry| entry.ended_at)
            .unwrap_or(now);
        self.transitions.push(TransitionEntry {
            state_name: to,
            actor_id: actor_id.to_string(),
            started_at,
            ended_at: now,
        });
        self.workflow_state_name = to;
        self.assigned_user_id = Some(actor_id.to_string());
        self.updated_at = now;

        tracing::info!(
            request_number = %self.request_number,
            loan_number = %self.loan_number,
            from_state = %from,
            to_state = %to,
            actor = actor_id,
            "Workflow state transition"
        );
        Ok(())
    }

    /// Execution status only moves forward; completing twice is a no-op.
    pub fn mark_completed(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.resume_token = None;
        self.updated_at = Utc::now();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
