//! Event router.
//!
//! Dispatches JSON events on their `handlerType` field to the review coordinator
//! and renders the JSON responses. Failures become `{"Success": false, ...}`
//! envelopes; the router itself never returns an error.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::coordinator::{
    DecisionUpdateRequest, ReviewCoordinator, ReviewError, ReviewTypeUpdateRequest,
    StartReviewRequest,
};
use crate::integration::PpaOutcome;
use crate::workflows::WorkflowKey;

pub mod events;
pub mod responses;

pub use events::HandlerEvent;
use events::*;

pub struct LoanReviewRouter {
    coordinator: Arc<ReviewCoordinator>,
}

impl LoanReviewRouter {
    pub fn new(coordinator: Arc<ReviewCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<ReviewCoordinator> {
        &self.coordinator
    }

    pub async fn route(&self, input: Value) -> Value {
        let event: HandlerEvent = match serde_json::from_value(input) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Rejected malformed event");
                return responses::error("unknown", "unknown", &format!("Invalid JSON format: {}", e));
            }
        };

        let Some(handler_type) = event.handler_type.clone() else {
            return responses::error(
                event.request_number_or_unknown(),
                event.loan_number_or_unknown(),
                "Missing handlerType",
            );
        };
        info!(handler_type = %handler_type, "Routing event");

        let result = match handler_type.as_str() {
            HANDLER_START_PPA_REVIEW_API => self.start_review(&event).await,
            HANDLER_REVIEW_TYPE_VALIDATION => self.review_type_validation(&event).await,
            HANDLER_REGISTER_CALLBACK => self.register_callback(&event).await,
            HANDLER_LOAN_DECISION_UPDATE_API => self.loan_decision_update(&event).await,
            HANDLER_REVIEW_TYPE_UPDATE_API => self.review_type_update(&event).await,
            HANDLER_COMPLETION_CRITERIA => self.completion_criteria(&event).await,
            HANDLER_LOAN_STATUS_DETERMINATION => self.loan_status_determination(&event).await,
            HANDLER_VEND_PPA_INTEGRATION => self.vend_ppa_integration(&event).await,
            HANDLER_RECLASS_TIMER_EXPIRATION => self.reclass_timer_expiration(&event).await,
            HANDLER_ATTRIBUTE_VALIDATION => self.attribute_validation(&event).await,
            HANDLER_ABORT_REVIEW => self.abort_review(&event).await,
            other => {
                error!(handler_type = other, "Unknown handler type");
                return responses::error(
                    event.request_number_or_unknown(),
                    event.loan_number_or_unknown(),
                    &format!("Unknown handler type: {}", other),
                );
            }
        };

        result.unwrap_or_else(|e| {
            error!(handler_type = %handler_type, error = %e, "Handler failed");
            responses::error(
                event.request_number_or_unknown(),
                event.loan_number_or_unknown(),
                &e.to_string(),
            )
        })
    }

    fn key(event: &HandlerEvent) -> Result<WorkflowKey, ReviewError> {
        event
            .key()
            .map_err(|field| ReviewError::Validation(format!("{} is required", field)))
    }

    fn timeout(event: &HandlerEvent) -> Option<Duration> {
        event.timeout_seconds.map(Duration::from_secs)
    }

    async fn start_review(&self, event: &HandlerEvent) -> Result<Value, ReviewError> {
        let key = Self::key(event)?;
        let record = self
            .coordinator
            .start_review(StartReviewRequest {
                request_number: key.request_number,
                loan_number: key.loan_number,
                review_type: event.review_type.clone().unwrap_or_default(),
                attributes: event.attribute_inputs(),
                actor_id: event.review_step_user_id.clone(),
                task_number: event.task_number,
            })
            .await?;
        Ok(responses::workflows_response(&record))
    }

    async fn review_type_validation(&self, event: &HandlerEvent) -> Result<Value, ReviewError> {
        let key = Self::key(event)?;
        let review_type = event.review_type.clone().unwrap_or_default();
        let record = self
            .coordinator
            .validate_review_type(&key, &review_type, event.review_step_user_id.as_deref())
            .await?;
        Ok(responses::success(
            &key.request_number,
            &key.loan_number,
            json!({
                "ReviewType": record.review_type.map(|t| t.as_str()),
                "IsValid": true,
            }),
        ))
    }

    async fn register_callback(&self, event: &HandlerEvent) -> Result<Value, ReviewError> {
        let key = Self::key(event)?;
        let token = event.task_token.clone().unwrap_or_default();
        let record = self
            .coordinator
            .register_callback(&key, &token, event.is_reclass_confirmation.unwrap_or(false))
            .await?;
        Ok(responses::success(
            &key.request_number,
            &key.loan_number,
            json!({
                "Message": "Task token registered",
                "CurrentWorkflowStage": record.current_stage,
            }),
        ))
    }

    async fn loan_decision_update(&self, event: &HandlerEvent) -> Result<Value, ReviewError> {
        let key = Self::key(event)?;
        let outcome = self
            .coordinator
            .update_loan_decision(DecisionUpdateRequest {
                key,
                loan_decision: event.loan_decision.clone(),
                attributes: event.attribute_inputs(),
                resume_token: event.task_token.clone(),
                actor_id: event.review_step_user_id.clone(),
                timeout: Self::timeout(event),
            })
            .await?;
        Ok(responses::workflows_response(&outcome.record))
    }

    async fn review_type_update(&self, event: &HandlerEvent) -> Result<Value, ReviewError> {
        let key = Self::key(event)?;
        let review_type = event
            .new_review_type
            .clone()
            .or_else(|| event.review_type.clone())
            .unwrap_or_default();
        let outcome = self
            .coordinator
            .update_review_type(ReviewTypeUpdateRequest {
                key,
                review_type,
                resume_token: event.task_token.clone(),
                actor_id: event.review_step_user_id.clone(),
                timeout: Self::timeout(event),
            })
            .await?;
        Ok(responses::workflows_response(&outcome.record))
    }

    async fn completion_criteria(&self, event: &HandlerEvent) -> Result<Value, ReviewError> {
        let key = Self::key(event)?;
        let report = self.coordinator.check_completion(&key).await?;
        Ok(responses::success(
            &key.request_number,
            &key.loan_number,
            json!({
                "Complete": report.outcome.is_complete,
                "BlockingReasons": report.outcome.blocking_reasons.join(", "),
            }),
        ))
    }

    async fn loan_status_determination(&self, event: &HandlerEvent) -> Result<Value, ReviewError> {
        let key = Self::key(event)?;
        let determined = self.coordinator.determine_loan_status(&key).await?;
        Ok(responses::success(
            &key.request_number,
            &key.loan_number,
            json!({
                "LoanStatus": determined.status.as_str(),
                "LoanDecision": determined.record.loan_decision,
            }),
        ))
    }

    async fn vend_ppa_integration(&self, event: &HandlerEvent) -> Result<Value, ReviewError> {
        let key = Self::key(event)?;
        let completed = self.coordinator.complete_review(&key).await?;
        let ppa = match completed.ppa {
            Some(PpaOutcome::Published { status, response }) => {
                json!({"Status": status, "Response": response})
            }
            Some(PpaOutcome::Skipped { reason }) => json!({"Skipped": reason}),
            None => json!({"Skipped": "Review already complete"}),
        };
        Ok(responses::success(
            &key.request_number,
            &key.loan_number,
            json!({
                "Status": completed.record.status().as_str(),
                "WorkflowStateName": completed.record.workflow_state_name.as_str(),
                "VendPpaResponse": ppa,
            }),
        ))
    }

    async fn reclass_timer_expiration(&self, event: &HandlerEvent) -> Result<Value, ReviewError> {
        let key = Self::key(event)?;
        self.coordinator.handle_reclass_expiration(&key).await?;
        Ok(responses::success(
            &key.request_number,
            &key.loan_number,
            json!({"Message": "Reclass expiration notification sent"}),
        ))
    }

    async fn attribute_validation(&self, event: &HandlerEvent) -> Result<Value, ReviewError> {
        let key = Self::key(event)?;
        let report = self.coordinator.validate_attributes(&key).await?;
        if !report.is_valid() {
            return Ok(responses::error(
                &key.request_number,
                &key.loan_number,
                &format!("Invalid attribute decisions: {}", report.problems.join(", ")),
            ));
        }
        Ok(responses::success(
            &key.request_number,
            &key.loan_number,
            json!({
                "IsValid": true,
                "AttributeCount": report.attribute_count,
                "Message": "All attributes validated successfully",
            }),
        ))
    }

    async fn abort_review(&self, event: &HandlerEvent) -> Result<Value, ReviewError> {
        let key = Self::key(event)?;
        let error_code = event.error_code.as_deref().unwrap_or("ReviewAborted");
        let cause = event.cause.as_deref().unwrap_or("Aborted by request");
        self.coordinator.abort_review(&key, error_code, cause).await?;
        Ok(responses::success(
            &key.request_number,
            &key.loan_number,
            json!({"Message": "Workflow execution failed", "Error": error_code}),
        ))
    }
}
