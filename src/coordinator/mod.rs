//! Review coordinator.
//!
//! Every operation that changes a workflow record follows the same sequence:
//! mutate the record, append a transition entry, persist it, then hand the fresh
//! record to the callback bridge so a blocked API caller can return it.
//!
//! API-driven updates (decision and review type changes) additionally resume the
//! paused workflow execution with its single-use task token and wait, bounded by
//! the callback timeout, for the engine to report back. On timeout they return the
//! last persisted state instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

use crate::callback::CallbackBridge;
use crate::config::LoanReviewConfig;
use crate::integration::{DisabledPpaClient, HttpPpaClient, PpaClient, PpaOutcome};
use crate::notifications::{
    NotificationChannel, NotificationRenderer, TemplateCatalog, TracingNotificationChannel,
    RECLASS_EXPIRED_TEMPLATE, REPURCHASE_TEMPLATE,
};
use crate::observability::{create_workflow_span, OperationTimer};
use crate::orchestration::{execution_name, OrchestrationError, Orchestrator};
use crate::persistence::{PersistenceError, WorkflowRepository};
use crate::telemetry::generate_correlation_id;
use crate::workflows::types::{
    INITIAL_LOAN_DECISION, STAGE_DECISION_RECEIVED, STAGE_STATUS_DETERMINED_PREFIX,
    STAGE_WAITING_FOR_DECISION, STAGE_WAITING_FOR_RECLASS,
};
use crate::workflows::{
    determine_status, evaluate, CompletionOutcome, ExecutionStatus, LoanStatus, WorkflowKey,
    WorkflowRecord, WorkflowStateName, SYSTEM_USER,
};

pub mod errors;
pub mod validation;

pub use errors::ReviewError;

use validation::{
    merge_attributes, parse_attributes, parse_review_type, parse_start_attributes,
    validate_loan_number, validate_request_number,
};

pub const RESUMED_ACTION_LOAN_DECISION: &str = "LoanDecisionUpdate";
pub const RESUMED_ACTION_REVIEW_TYPE: &str = "ReviewTypeUpdate";

/// Recipient selectors resolved by the notification channel
pub const REPURCHASE_RECIPIENT: &str = "repurchase";
pub const RECLASS_RECIPIENT: &str = "reclass";

/// Raw attribute decision as received from a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInput {
    pub name: String,
    pub decision: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StartReviewRequest {
    pub request_number: String,
    pub loan_number: String,
    pub review_type: String,
    pub attributes: Vec<AttributeInput>,
    pub actor_id: Option<String>,
    pub task_number: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DecisionUpdateRequest {
    pub key: WorkflowKey,
    pub loan_decision: Option<String>,
    pub attributes: Vec<AttributeInput>,
    pub resume_token: Option<String>,
    pub actor_id: Option<String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ReviewTypeUpdateRequest {
    pub key: WorkflowKey,
    pub review_type: String,
    pub resume_token: Option<String>,
    pub actor_id: Option<String>,
    pub timeout: Option<Duration>,
}

/// How an API update's wait on the workflow engine ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The engine finished its step and delivered a fresh record
    Delivered,
    /// No notification arrived in time; the record is the last persisted state
    TimedOut,
    /// No task token was available, so the engine was not resumed
    NotResumed,
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub record: WorkflowRecord,
    pub callback: CallbackOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub key: WorkflowKey,
    pub outcome: CompletionOutcome,
}

#[derive(Debug, Clone)]
pub struct StatusDetermination {
    pub record: WorkflowRecord,
    pub status: LoanStatus,
}

#[derive(Debug, Clone)]
pub struct CompletedReview {
    pub record: WorkflowRecord,
    /// `None` when the review was already complete and nothing was published
    pub ppa: Option<PpaOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValidation {
    pub attribute_count: usize,
    pub problems: Vec<String>,
}

impl AttributeValidation {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub state_machine_id: String,
    pub execution_name_prefix: String,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            state_machine_id: "ldc-loan-review-workflow".to_string(),
            execution_name_prefix: "ldc-loan-review".to_string(),
        }
    }
}

/// Runs review operations against the injected collaborators
pub struct ReviewCoordinator {
    repository: Arc<dyn WorkflowRepository>,
    orchestrator: Arc<dyn Orchestrator>,
    bridge: CallbackBridge,
    notifier: Arc<dyn NotificationChannel>,
    ppa: Arc<dyn PpaClient>,
    settings: CoordinatorSettings,
}

fn actor_or_system(actor_id: Option<&str>) -> String {
    actor_id
        .map(str::trim)
        .filter(|actor| !actor.is_empty())
        .unwrap_or(SYSTEM_USER)
        .to_string()
}

impl ReviewCoordinator {
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        orchestrator: Arc<dyn Orchestrator>,
        bridge: CallbackBridge,
    ) -> Self {
        Self {
            repository,
            orchestrator,
            bridge,
            notifier: Arc::new(TracingNotificationChannel::default()),
            ppa: Arc::new(DisabledPpaClient),
            settings: CoordinatorSettings::default(),
        }
    }

    /// Wire notification, PPA and bridge settings from configuration
    pub fn from_config(
        config: &LoanReviewConfig,
        repository: Arc<dyn WorkflowRepository>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> anyhow::Result<Self> {
        let bridge = CallbackBridge::new(config.callback.timeout())
            .with_max_timeout(config.callback.max_timeout());

        let mut renderer =
            NotificationRenderer::new(TemplateCatalog::new(config.notifications.templates.clone()));
        if let Some(sender) = &config.notifications.sender {
            renderer = renderer.with_sender(sender.clone());
        }
        for (selector, address) in &config.notifications.recipients {
            renderer = renderer.with_recipient(selector.clone(), address.clone());
        }

        let ppa = HttpPpaClient::new(
            config.integration.ppa_endpoint.clone(),
            Duration::from_secs(config.integration.timeout_seconds),
        )?;

        Ok(Self::new(repository, orchestrator, bridge)
            .with_notifier(Arc::new(TracingNotificationChannel::new(renderer)))
            .with_ppa_client(Arc::new(ppa))
            .with_settings(CoordinatorSettings {
                state_machine_id: config.orchestration.state_machine_id.clone(),
                execution_name_prefix: config.orchestration.execution_name_prefix.clone(),
            }))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationChannel>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_ppa_client(mut self, ppa: Arc<dyn PpaClient>) -> Self {
        self.ppa = ppa;
        self
    }

    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn bridge(&self) -> &CallbackBridge {
        &self.bridge
    }

    pub async fn get_review(&self, key: &WorkflowKey) -> Result<WorkflowRecord, ReviewError> {
        self.load(key).await
    }

    async fn load(&self, key: &WorkflowKey) -> Result<WorkflowRecord, ReviewError> {
        self.repository
            .find(key)
            .await?
            .ok_or_else(|| ReviewError::NotFound(key.clone()))
    }

    /// Persist, then wake any caller blocked on this record
    async fn commit(&self, record: &WorkflowRecord) -> Result<(), ReviewError> {
        self.repository.save(record).await?;
        self.bridge.notify_callback(&record.key(), record.clone());
        Ok(())
    }

    async fn send_notification(&self, recipient: &str, template: &str, record: &WorkflowRecord) {
        if let Err(e) = self.notifier.send(recipient, template, record).await {
            error!(
                request_number = %record.request_number,
                loan_number = %record.loan_number,
                template,
                error = %e,
                "Failed to send notification"
            );
        }
    }

    /// Start a new review and its workflow execution.
    pub async fn start_review(&self, request: StartReviewRequest) -> Result<WorkflowRecord, ReviewError> {
        let span = create_workflow_span(
            "start_review",
            &request.request_number,
            &request.loan_number,
            &generate_correlation_id(),
        );
        async move {
            let _timer = OperationTimer::new("start_review");

            validate_request_number(&request.request_number)?;
            validate_loan_number(&request.loan_number)?;
            let review_type = parse_review_type(&request.review_type)?;
            let attributes = parse_start_attributes(&request.attributes)?;
            let actor = actor_or_system(request.actor_id.as_deref());

            let key = WorkflowKey::new(request.request_number.trim(), request.loan_number.clone());
            if let Some(existing) = self.repository.find(&key).await? {
                if existing.status() == ExecutionStatus::Running {
                    warn!(workflow = %key, "Review already running");
                    return Err(ReviewError::AlreadyActive(key));
                }
            }

            let name = execution_name(&self.settings.execution_name_prefix, &key.request_number);
            let input = json!({
                "RequestNumber": key.request_number,
                "LoanNumber": key.loan_number,
                "ReviewType": review_type.as_str(),
                "ReviewStepUserId": actor,
                "TaskNumber": request.task_number,
            });
            let handle = self
                .orchestrator
                .start_execution(&self.settings.state_machine_id, &name, input)
                .await?;

            let mut record = WorkflowRecord::new(key, Some(review_type), &actor);
            record.loan_decision = Some(INITIAL_LOAN_DECISION.to_string());
            record.attributes = attributes;
            record.execution_id = Some(handle.execution_id.clone());
            record.task_number = request.task_number;

            self.commit(&record).await?;
            info!(
                execution_id = %handle.execution_id,
                review_type = %review_type,
                attributes = record.attributes.len(),
                "Loan review started"
            );
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Engine step: confirm the review type, creating the record if it is missing.
    pub async fn validate_review_type(
        &self,
        key: &WorkflowKey,
        review_type: &str,
        actor_id: Option<&str>,
    ) -> Result<WorkflowRecord, ReviewError> {
        let span = create_workflow_span(
            "validate_review_type",
            &key.request_number,
            &key.loan_number,
            &generate_correlation_id(),
        );
        async move {
            let review_type = parse_review_type(review_type)?;
            let actor = actor_or_system(actor_id);

            let record = match self.repository.find(key).await? {
                Some(mut record) => {
                    record.advance(WorkflowStateName::ValidateReviewType, &actor)?;
                    record.review_type = Some(review_type);
                    record
                }
                None => {
                    info!(workflow = %key, "Creating workflow record during review type validation");
                    let mut record = WorkflowRecord::new(key.clone(), Some(review_type), &actor);
                    record.loan_decision = Some(INITIAL_LOAN_DECISION.to_string());
                    record
                }
            };

            self.commit(&record).await?;
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Engine step: hold the task token the paused execution will be resumed with.
    pub async fn register_callback(
        &self,
        key: &WorkflowKey,
        token: &str,
        is_reclass_confirmation: bool,
    ) -> Result<WorkflowRecord, ReviewError> {
        let span = create_workflow_span(
            "register_callback",
            &key.request_number,
            &key.loan_number,
            &generate_correlation_id(),
        );
        async move {
            if token.trim().is_empty() {
                return Err(ReviewError::Validation("TaskToken is required".to_string()));
            }

            let mut record = self.load(key).await?;
            if record.is_terminal() {
                return Err(ReviewError::Validation(format!(
                    "Workflow {} is already complete",
                    key
                )));
            }

            record.is_reclass_confirmation = is_reclass_confirmation;
            record.current_stage = if is_reclass_confirmation {
                STAGE_WAITING_FOR_RECLASS
            } else {
                STAGE_WAITING_FOR_DECISION
            }
            .to_string();
            record.touch();

            self.repository.save(&record).await?;
            self.repository
                .store_resume_token(key, token, is_reclass_confirmation)
                .await
                .map_err(|e| match e {
                    PersistenceError::MissingRecord(key) => ReviewError::NotFound(key),
                    other => ReviewError::Persistence(other),
                })?;
            record.resume_token = Some(token.to_string());

            let mut snapshot = record.clone();
            snapshot.resume_token = None;
            self.bridge.notify_callback(key, snapshot);

            info!(reclass_confirmation = is_reclass_confirmation, "Task token registered");
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// API: record a loan decision and resume the paused execution.
    pub async fn update_loan_decision(
        &self,
        request: DecisionUpdateRequest,
    ) -> Result<UpdateOutcome, ReviewError> {
        let span = create_workflow_span(
            "update_loan_decision",
            &request.key.request_number,
            &request.key.loan_number,
            &generate_correlation_id(),
        );
        async move {
            let _timer = OperationTimer::new("update_loan_decision");

            let updates = parse_attributes(&request.attributes)?;
            let actor = actor_or_system(request.actor_id.as_deref());
            let mut record = self.load(&request.key).await?;
            record
                .workflow_state_name
                .check_transition(WorkflowStateName::LoanDecisionUpdate)?;

            if let Some(decision) = request.loan_decision.as_deref().map(str::trim) {
                if !decision.is_empty() {
                    record.loan_decision = Some(decision.to_string());
                }
            }
            merge_attributes(&mut record.attributes, updates);
            record.current_stage = STAGE_DECISION_RECEIVED.to_string();
            record.advance(WorkflowStateName::LoanDecisionUpdate, &actor)?;
            self.commit(&record).await?;

            let output = json!({
                "RequestNumber": record.request_number,
                "LoanNumber": record.loan_number,
                "LoanDecision": record.loan_decision,
                "ResumedAction": RESUMED_ACTION_LOAN_DECISION,
                "Attributes": record.attributes.iter().map(|attr| json!({
                    "Name": attr.name,
                    "Decision": attr.decision.map(|d| d.as_str()),
                })).collect::<Vec<_>>(),
            });
            self.resume_and_wait(record, request.resume_token, output, request.timeout)
                .await
        }
        .instrument(span)
        .await
    }

    /// API: change the review type and resume the paused execution.
    pub async fn update_review_type(
        &self,
        request: ReviewTypeUpdateRequest,
    ) -> Result<UpdateOutcome, ReviewError> {
        let span = create_workflow_span(
            "update_review_type",
            &request.key.request_number,
            &request.key.loan_number,
            &generate_correlation_id(),
        );
        async move {
            let _timer = OperationTimer::new("update_review_type");

            let review_type = parse_review_type(&request.review_type)?;
            let actor = actor_or_system(request.actor_id.as_deref());
            let mut record = self.load(&request.key).await?;

            record.advance(WorkflowStateName::ValidateReviewType, &actor)?;
            record.review_type = Some(review_type);
            self.commit(&record).await?;

            let output = json!({
                "RequestNumber": record.request_number,
                "LoanNumber": record.loan_number,
                "ReviewType": review_type.as_str(),
                "ResumedAction": RESUMED_ACTION_REVIEW_TYPE,
            });
            self.resume_and_wait(record, request.resume_token, output, request.timeout)
                .await
        }
        .instrument(span)
        .await
    }

    async fn resume_and_wait(
        &self,
        record: WorkflowRecord,
        caller_token: Option<String>,
        output: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<UpdateOutcome, ReviewError> {
        let key = record.key();

        // Listen before resuming so a fast engine step cannot notify first.
        let pending = self.bridge.register(&key)?;

        let stored_token = self.repository.take_resume_token(&key).await?;
        let Some(token) = caller_token
            .filter(|t| !t.trim().is_empty())
            .or_else(|| stored_token.clone())
        else {
            warn!(workflow = %key, "No task token held, workflow execution not resumed");
            return Ok(UpdateOutcome {
                record,
                callback: CallbackOutcome::NotResumed,
            });
        };

        if let Err(e) = self.orchestrator.resume(&token, output).await {
            error!(workflow = %key, error = %e, "Failed to resume workflow execution");
            // A rejected token is spent; anything else may succeed on retry.
            let keep = match &e {
                OrchestrationError::InvalidToken(_) => stored_token.filter(|stored| *stored != token),
                _ => Some(token),
            };
            if let Some(keep) = keep {
                self.repository
                    .store_resume_token(&key, &keep, record.is_reclass_confirmation)
                    .await?;
                info!(workflow = %key, "Task token kept for retry");
            }
            return Err(ReviewError::ResumeFailed(e));
        }
        info!(workflow = %key, "Workflow execution resumed, waiting for callback");

        match pending.wait(timeout).await {
            Some(fresh) => Ok(UpdateOutcome {
                record: fresh,
                callback: CallbackOutcome::Delivered,
            }),
            None => {
                let latest = self.repository.find(&key).await?.unwrap_or(record);
                Ok(UpdateOutcome {
                    record: latest,
                    callback: CallbackOutcome::TimedOut,
                })
            }
        }
    }

    /// Engine step: decide whether decision gathering is finished.
    pub async fn check_completion(&self, key: &WorkflowKey) -> Result<CompletionReport, ReviewError> {
        let span = create_workflow_span(
            "check_completion",
            &key.request_number,
            &key.loan_number,
            &generate_correlation_id(),
        );
        async move {
            let mut record = self.load(key).await?;
            let outcome = evaluate(record.loan_decision.as_deref(), &record.attributes);

            if outcome.is_complete {
                record.advance(WorkflowStateName::CompletionCriteriaMet, SYSTEM_USER)?;
                self.commit(&record).await?;
                info!("Completion criteria met");
            } else {
                info!(reasons = ?outcome.blocking_reasons, "Completion criteria not met");
            }

            Ok(CompletionReport {
                key: key.clone(),
                outcome,
            })
        }
        .instrument(span)
        .await
    }

    /// Engine step: aggregate attribute decisions into the final loan status.
    pub async fn determine_loan_status(&self, key: &WorkflowKey) -> Result<StatusDetermination, ReviewError> {
        let span = create_workflow_span(
            "determine_loan_status",
            &key.request_number,
            &key.loan_number,
            &generate_correlation_id(),
        );
        async move {
            crate::time_operation!("determine_loan_status");

            let mut record = self.load(key).await?;
            record
                .workflow_state_name
                .check_transition(WorkflowStateName::CompletionCriteriaMet)?;
            let status = determine_status(&record.attributes)?;

            record.loan_status = Some(status);
            record.loan_decision = Some(status.to_string());
            record.current_stage = format!("{}{}", STAGE_STATUS_DETERMINED_PREFIX, status);
            record.advance(WorkflowStateName::CompletionCriteriaMet, SYSTEM_USER)?;
            self.commit(&record).await?;
            info!(loan_status = %status, "Loan status determined");

            if status == LoanStatus::Repurchase {
                self.send_notification(REPURCHASE_RECIPIENT, REPURCHASE_TEMPLATE, &record)
                    .await;
            }

            Ok(StatusDetermination { record, status })
        }
        .instrument(span)
        .await
    }

    /// Engine step: publish the decision downstream and close the review.
    ///
    /// A failed publish is logged and does not stop completion.
    pub async fn complete_review(&self, key: &WorkflowKey) -> Result<CompletedReview, ReviewError> {
        let span = create_workflow_span(
            "complete_review",
            &key.request_number,
            &key.loan_number,
            &generate_correlation_id(),
        );
        async move {
            crate::time_operation!("complete_review");

            let mut record = self.load(key).await?;
            if record.is_terminal() {
                info!("Review already complete");
                return Ok(CompletedReview { record, ppa: None });
            }
            record
                .workflow_state_name
                .check_transition(WorkflowStateName::WorkflowComplete)?;

            let ppa = match self.ppa.publish_decision(&record).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "PPA publish failed, completing review anyway");
                    PpaOutcome::Skipped {
                        reason: format!("PPA integration ignored due to error: {}", e),
                    }
                }
            };

            record.mark_completed();
            record.advance(WorkflowStateName::WorkflowComplete, SYSTEM_USER)?;
            self.commit(&record).await?;
            info!("Review completed");

            Ok(CompletedReview {
                record,
                ppa: Some(ppa),
            })
        }
        .instrument(span)
        .await
    }

    /// Engine step: the reclass confirmation window closed without a confirmation.
    pub async fn handle_reclass_expiration(&self, key: &WorkflowKey) -> Result<WorkflowRecord, ReviewError> {
        let record = self.load(key).await?;
        warn!(workflow = %key, "Reclass confirmation window expired");
        self.send_notification(RECLASS_RECIPIENT, RECLASS_EXPIRED_TEMPLATE, &record)
            .await;
        Ok(record)
    }

    /// Engine step: report attributes that still lack a decision.
    pub async fn validate_attributes(&self, key: &WorkflowKey) -> Result<AttributeValidation, ReviewError> {
        let record = self.load(key).await?;
        let problems = record
            .attributes
            .iter()
            .filter(|attr| attr.decision.is_none())
            .map(|attr| format!("{}: no decision", attr.name))
            .collect();
        Ok(AttributeValidation {
            attribute_count: record.attributes.len(),
            problems,
        })
    }

    /// Fail the paused execution with the held task token.
    pub async fn abort_review(
        &self,
        key: &WorkflowKey,
        error_code: &str,
        cause: &str,
    ) -> Result<WorkflowRecord, ReviewError> {
        let record = self.load(key).await?;
        let token = self
            .repository
            .take_resume_token(key)
            .await?
            .ok_or_else(|| ReviewError::Validation(format!("No task token held for {}", key)))?;

        self.orchestrator.fail(&token, error_code, cause).await?;
        warn!(workflow = %key, error_code, cause, "Review aborted");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::{MockPpaClient, PpaError};
    use crate::notifications::MockNotificationChannel;
    use crate::orchestration::{InMemoryOrchestrator, MockOrchestrator};
    use crate::persistence::{InMemoryWorkflowRepository, MockWorkflowRepository};
    use crate::workflows::{AttributeDecision, DecisionValue};

    fn key() -> WorkflowKey {
        WorkflowKey::new("REQ-1", "1234567890")
    }

    fn coordinator() -> (ReviewCoordinator, Arc<InMemoryWorkflowRepository>) {
        let repository = Arc::new(InMemoryWorkflowRepository::new());
        let coordinator = ReviewCoordinator::new(
            repository.clone(),
            Arc::new(InMemoryOrchestrator::new()),
            CallbackBridge::new(Duration::from_millis(20)),
        );
        (coordinator, repository)
    }

    async fn seed(repository: &InMemoryWorkflowRepository, decisions: &[(&str, DecisionValue)]) -> WorkflowRecord {
        let mut record = WorkflowRecord::new(key(), Some(crate::workflows::ReviewType::Ldc), SYSTEM_USER);
        record.attributes = decisions
            .iter()
            .map(|(name, d)| AttributeDecision::new(*name, Some(*d)))
            .collect();
        repository.save(&record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn start_review_rejects_bad_loan_number_before_touching_state() {
        let (coordinator, repository) = coordinator();
        let err = coordinator
            .start_review(StartReviewRequest {
                request_number: "REQ-1".to_string(),
                loan_number: "12345".to_string(),
                review_type: "LDC".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(repository.is_empty().await);
    }

    #[tokio::test]
    async fn repurchase_status_sends_notification() {
        let (coordinator, repository) = coordinator();
        seed(&repository, &[("A", DecisionValue::Repurchase), ("B", DecisionValue::Approved)]).await;

        let mut notifier = MockNotificationChannel::new();
        notifier
            .expect_send()
            .withf(|recipient, template, record| {
                recipient == REPURCHASE_RECIPIENT
                    && template == REPURCHASE_TEMPLATE
                    && record.loan_status == Some(LoanStatus::Repurchase)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let coordinator = coordinator.with_notifier(Arc::new(notifier));

        let determined = coordinator.determine_loan_status(&key()).await.unwrap();
        assert_eq!(determined.status, LoanStatus::Repurchase);
        assert_eq!(determined.record.loan_decision.as_deref(), Some("Repurchase"));
        assert_eq!(determined.record.current_stage, "Loan Status Determined: Repurchase");
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_status_determination() {
        let (coordinator, repository) = coordinator();
        seed(&repository, &[("A", DecisionValue::Repurchase)]).await;

        let mut notifier = MockNotificationChannel::new();
        notifier.expect_send().returning(|_, _, _| {
            Err(crate::notifications::NotificationError::DeliveryFailed("smtp down".to_string()))
        });
        let coordinator = coordinator.with_notifier(Arc::new(notifier));

        assert!(coordinator.determine_loan_status(&key()).await.is_ok());
    }

    #[tokio::test]
    async fn ppa_failure_still_completes_review() {
        let (coordinator, repository) = coordinator();
        let mut record = seed(&repository, &[("A", DecisionValue::Approved)]).await;
        record.advance(WorkflowStateName::CompletionCriteriaMet, SYSTEM_USER).unwrap();
        repository.save(&record).await.unwrap();

        let mut ppa = MockPpaClient::new();
        ppa.expect_publish_decision().times(1).returning(|_| {
            Err(PpaError::Status {
                status: 500,
                body: "boom".to_string(),
            })
        });
        let coordinator = coordinator.with_ppa_client(Arc::new(ppa));

        let completed = coordinator.complete_review(&key()).await.unwrap();
        assert_eq!(completed.record.status(), ExecutionStatus::Completed);
        assert_eq!(completed.record.workflow_state_name, WorkflowStateName::WorkflowComplete);
        assert!(matches!(completed.ppa, Some(PpaOutcome::Skipped { .. })));

        let again = coordinator.complete_review(&key()).await.unwrap();
        assert!(again.ppa.is_none());
        assert_eq!(again.record.transitions().len(), completed.record.transitions().len());
    }

    #[tokio::test]
    async fn resume_failure_is_surfaced_and_releases_the_bridge() {
        let repository = Arc::new(InMemoryWorkflowRepository::new());
        seed(&repository, &[("A", DecisionValue::Pending)]).await;
        repository.store_resume_token(&key(), "token-1", false).await.unwrap();

        let mut orchestrator = MockOrchestrator::new();
        orchestrator
            .expect_resume()
            .withf(|token, _| token == "token-1")
            .times(1)
            .returning(|token, _| Err(OrchestrationError::InvalidToken(token.to_string())));

        let coordinator = ReviewCoordinator::new(
            repository,
            Arc::new(orchestrator),
            CallbackBridge::new(Duration::from_millis(20)),
        );
        let err = coordinator
            .update_loan_decision(DecisionUpdateRequest {
                key: key(),
                loan_decision: None,
                attributes: vec![AttributeInput {
                    name: "A".to_string(),
                    decision: Some("Approved".to_string()),
                }],
                resume_token: None,
                actor_id: Some("reviewer".to_string()),
                timeout: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ReviewError::ResumeFailed(_)));
        assert!(!coordinator.bridge().has_pending_callback(&key()));
    }

    #[tokio::test]
    async fn transient_resume_failure_keeps_the_token_for_retry() {
        let repository = Arc::new(InMemoryWorkflowRepository::new());
        seed(&repository, &[("A", DecisionValue::Pending)]).await;
        repository.store_resume_token(&key(), "token-1", true).await.unwrap();

        let mut orchestrator = MockOrchestrator::new();
        orchestrator
            .expect_resume()
            .withf(|token, _| token == "token-1")
            .times(1)
            .returning(|_, _| Err(OrchestrationError::Unavailable("throttled".to_string())));

        let coordinator = ReviewCoordinator::new(
            repository.clone(),
            Arc::new(orchestrator),
            CallbackBridge::new(Duration::from_millis(20)),
        );
        let err = coordinator
            .update_loan_decision(DecisionUpdateRequest {
                key: key(),
                loan_decision: None,
                attributes: vec![AttributeInput {
                    name: "A".to_string(),
                    decision: Some("Approved".to_string()),
                }],
                resume_token: None,
                actor_id: Some("reviewer".to_string()),
                timeout: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReviewError::ResumeFailed(OrchestrationError::Unavailable(ref reason)) if reason == "throttled"
        ));
        let stored = repository.find(&key()).await.unwrap().unwrap();
        assert_eq!(stored.resume_token.as_deref(), Some("token-1"));
        assert!(stored.is_reclass_confirmation);
        assert_eq!(stored.attributes[0].decision, Some(DecisionValue::Approved));
        assert!(!coordinator.bridge().has_pending_callback(&key()));
    }

    #[tokio::test]
    async fn rejected_caller_token_leaves_the_stored_token_in_place() {
        let repository = Arc::new(InMemoryWorkflowRepository::new());
        seed(&repository, &[("A", DecisionValue::Pending)]).await;
        repository.store_resume_token(&key(), "token-1", false).await.unwrap();

        let mut orchestrator = MockOrchestrator::new();
        orchestrator
            .expect_resume()
            .withf(|token, _| token == "stale")
            .times(1)
            .returning(|token, _| Err(OrchestrationError::InvalidToken(token.to_string())));

        let coordinator = ReviewCoordinator::new(
            repository.clone(),
            Arc::new(orchestrator),
            CallbackBridge::new(Duration::from_millis(20)),
        );
        let err = coordinator
            .update_review_type(ReviewTypeUpdateRequest {
                key: key(),
                review_type: "Conduit".to_string(),
                resume_token: Some("stale".to_string()),
                actor_id: None,
                timeout: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ReviewError::ResumeFailed(OrchestrationError::InvalidToken(_))));
        let stored = repository.find(&key()).await.unwrap().unwrap();
        assert_eq!(stored.resume_token.as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn persistence_failure_surfaces_from_lookup() {
        let mut repository = MockWorkflowRepository::new();
        repository
            .expect_find()
            .returning(|_| Err(PersistenceError::StateCorruption { reason: "bad row".to_string() }));

        let coordinator = ReviewCoordinator::new(
            Arc::new(repository),
            Arc::new(InMemoryOrchestrator::new()),
            CallbackBridge::default(),
        );
        let err = coordinator.check_completion(&key()).await.unwrap_err();
        assert!(matches!(err, ReviewError::Persistence(_)));
    }

    #[tokio::test]
    async fn attribute_validation_reports_null_decisions() {
        let (coordinator, repository) = coordinator();
        let mut record = WorkflowRecord::new(key(), None, SYSTEM_USER);
        record.attributes = vec![
            AttributeDecision::new("CreditScore", None),
            AttributeDecision::pending("DebtRatio"),
        ];
        repository.save(&record).await.unwrap();

        let report = coordinator.validate_attributes(&key()).await.unwrap();
        assert_eq!(report.attribute_count, 2);
        assert_eq!(report.problems, vec!["CreditScore: no decision".to_string()]);
        assert!(!report.is_valid());
    }

    #[tokio::test]
    async fn abort_requires_a_held_token() {
        let (coordinator, repository) = coordinator();
        seed(&repository, &[]).await;
        let err = coordinator.abort_review(&key(), "Cancelled", "operator").await.unwrap_err();
        assert!(err.is_validation());
    }
}
