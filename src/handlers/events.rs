use serde::Deserialize;

use crate::coordinator::AttributeInput;
use crate::workflows::WorkflowKey;

pub const HANDLER_START_PPA_REVIEW_API: &str = "startPpaReviewApi";
pub const HANDLER_REVIEW_TYPE_VALIDATION: &str = "reviewTypeValidation";
pub const HANDLER_REGISTER_CALLBACK: &str = "registerCallback";
pub const HANDLER_LOAN_DECISION_UPDATE_API: &str = "loanDecisionUpdateApi";
pub const HANDLER_REVIEW_TYPE_UPDATE_API: &str = "reviewTypeUpdateApi";
pub const HANDLER_COMPLETION_CRITERIA: &str = "completionCriteria";
pub const HANDLER_LOAN_STATUS_DETERMINATION: &str = "loanStatusDetermination";
pub const HANDLER_VEND_PPA_INTEGRATION: &str = "vendPpaIntegration";
pub const HANDLER_RECLASS_TIMER_EXPIRATION: &str = "reclassTimerExpiration";
pub const HANDLER_ATTRIBUTE_VALIDATION: &str = "attributeValidation";
pub const HANDLER_ABORT_REVIEW: &str = "abortReview";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeEvent {
    #[serde(alias = "attributeName")]
    pub name: String,
    #[serde(default, alias = "attributeDecision")]
    pub decision: Option<String>,
}

impl From<AttributeEvent> for AttributeInput {
    fn from(event: AttributeEvent) -> Self {
        AttributeInput {
            name: event.name,
            decision: event.decision,
        }
    }
}

/// Inbound event; which fields are required depends on the handler type.
/// Engine steps may send camelCase keys, so those are accepted as aliases.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HandlerEvent {
    #[serde(rename = "handlerType")]
    pub handler_type: Option<String>,
    #[serde(alias = "requestNumber")]
    pub request_number: Option<String>,
    #[serde(alias = "loanNumber")]
    pub loan_number: Option<String>,
    #[serde(alias = "reviewType")]
    pub review_type: Option<String>,
    #[serde(alias = "newReviewType")]
    pub new_review_type: Option<String>,
    #[serde(alias = "loanDecision")]
    pub loan_decision: Option<String>,
    #[serde(alias = "attributes")]
    pub attributes: Option<Vec<AttributeEvent>>,
    #[serde(alias = "taskToken")]
    pub task_token: Option<String>,
    #[serde(alias = "isReclassConfirmation")]
    pub is_reclass_confirmation: Option<bool>,
    #[serde(alias = "reviewStepUserId")]
    pub review_step_user_id: Option<String>,
    #[serde(alias = "taskNumber")]
    pub task_number: Option<u64>,
    #[serde(alias = "errorCode")]
    pub error_code: Option<String>,
    #[serde(alias = "cause")]
    pub cause: Option<String>,
    #[serde(alias = "timeoutSeconds")]
    pub timeout_seconds: Option<u64>,
}

impl HandlerEvent {
    pub fn request_number_or_unknown(&self) -> &str {
        self.request_number.as_deref().unwrap_or("unknown")
    }

    pub fn loan_number_or_unknown(&self) -> &str {
        self.loan_number.as_deref().unwrap_or("unknown")
    }

    /// Both key fields, or the name of the first missing one
    pub fn key(&self) -> Result<WorkflowKey, &'static str> {
        let request_number = self
            .request_number
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or("RequestNumber")?;
        let loan_number = self
            .loan_number
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or("LoanNumber")?;
        Ok(WorkflowKey::new(request_number, loan_number))
    }

    pub fn attribute_inputs(&self) -> Vec<AttributeInput> {
        self.attributes
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(AttributeInput::from)
            .collect()
    }
}
