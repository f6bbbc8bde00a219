//! Shared builders for loan review integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use loan_review_workflow::orchestration::LocalWorkflowDriver;
use loan_review_workflow::{
    AttributeInput, CallbackBridge, DecisionUpdateRequest, InMemoryOrchestrator,
    InMemoryWorkflowRepository, LoanReviewRouter, ReviewCoordinator, StartReviewRequest,
    WorkflowKey, WorkflowRecord, WorkflowRepository,
};

pub const REQUEST_NUMBER: &str = "REQ-1001";
pub const LOAN_NUMBER: &str = "1234567890";

pub fn key() -> WorkflowKey {
    WorkflowKey::new(REQUEST_NUMBER, LOAN_NUMBER)
}

/// Coordinator wired to in-memory infrastructure
pub struct TestStack {
    pub coordinator: Arc<ReviewCoordinator>,
    pub repository: Arc<InMemoryWorkflowRepository>,
    pub engine: Arc<InMemoryOrchestrator>,
}

impl TestStack {
    /// Nothing plays the engine; tests issue tokens by hand
    pub fn manual(callback_timeout: Duration) -> Self {
        Self::build(callback_timeout, |coordinator| coordinator)
    }

    pub fn build(
        callback_timeout: Duration,
        customize: impl FnOnce(ReviewCoordinator) -> ReviewCoordinator,
    ) -> Self {
        let repository = Arc::new(InMemoryWorkflowRepository::new());
        let engine = Arc::new(InMemoryOrchestrator::new());
        let coordinator = ReviewCoordinator::new(
            repository.clone(),
            engine.clone(),
            CallbackBridge::new(callback_timeout),
        );
        Self {
            coordinator: Arc::new(customize(coordinator)),
            repository,
            engine,
        }
    }

    /// Same stack with the local driver reacting to engine events
    pub async fn driven(callback_timeout: Duration) -> Self {
        Self::driven_with(callback_timeout, |coordinator| coordinator).await
    }

    pub async fn driven_with(
        callback_timeout: Duration,
        customize: impl FnOnce(ReviewCoordinator) -> ReviewCoordinator,
    ) -> Self {
        let stack = Self::build(callback_timeout, customize);
        let events = stack.engine.subscribe().await;
        LocalWorkflowDriver::new(stack.coordinator.clone(), stack.engine.clone()).spawn(events);
        stack
    }

    pub fn router(&self) -> LoanReviewRouter {
        LoanReviewRouter::new(self.coordinator.clone())
    }

    pub async fn stored(&self) -> WorkflowRecord {
        self.repository
            .find(&key())
            .await
            .expect("repository lookup")
            .expect("record exists")
    }

    /// Poll the stored record until `check` holds
    pub async fn wait_until(&self, check: impl Fn(&WorkflowRecord) -> bool) -> WorkflowRecord {
        for _ in 0..400 {
            if let Some(record) = self.repository.find(&key()).await.expect("repository lookup") {
                if check(&record) {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("workflow record never reached the expected state");
    }

    pub async fn wait_for_token(&self) -> WorkflowRecord {
        self.wait_until(|record| record.resume_token.is_some()).await
    }
}

pub fn start_request(attributes: &[&str]) -> StartReviewRequest {
    StartReviewRequest {
        request_number: REQUEST_NUMBER.to_string(),
        loan_number: LOAN_NUMBER.to_string(),
        review_type: "LDC".to_string(),
        attributes: attributes
            .iter()
            .map(|name| AttributeInput {
                name: name.to_string(),
                decision: Some("Pending".to_string()),
            })
            .collect(),
        actor_id: Some("underwriter-1".to_string()),
        task_number: Some(42),
    }
}

pub fn decision(name: &str, value: &str) -> AttributeInput {
    AttributeInput {
        name: name.to_string(),
        decision: Some(value.to_string()),
    }
}

pub fn decision_update(attributes: Vec<AttributeInput>) -> DecisionUpdateRequest {
    DecisionUpdateRequest {
        key: key(),
        loan_decision: None,
        attributes,
        resume_token: None,
        actor_id: Some("reviewer-7".to_string()),
        timeout: None,
    }
}
