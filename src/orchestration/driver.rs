// Local workflow driver
// Plays the engine's part for the in-memory orchestrator: reacts to started and
// resumed executions by invoking the review steps in workflow order.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{InMemoryOrchestrator, OrchestratorEvent};
use crate::coordinator::{ReviewCoordinator, ReviewError};
use crate::workflows::{LoanStatus, WorkflowKey};

const RECORD_POLL_INTERVAL: Duration = Duration::from_millis(5);
const RECORD_POLL_ATTEMPTS: usize = 200;

pub struct LocalWorkflowDriver {
    coordinator: Arc<ReviewCoordinator>,
    engine: Arc<InMemoryOrchestrator>,
}

fn key_from(payload: &Value) -> Option<WorkflowKey> {
    let request_number = payload.get("RequestNumber")?.as_str()?;
    let loan_number = payload.get("LoanNumber")?.as_str()?;
    Some(WorkflowKey::new(request_number, loan_number))
}

impl LocalWorkflowDriver {
    pub fn new(coordinator: Arc<ReviewCoordinator>, engine: Arc<InMemoryOrchestrator>) -> Self {
        Self { coordinator, engine }
    }

    /// Process engine events until the sender side closes
    pub fn spawn(self, mut events: mpsc::UnboundedReceiver<OrchestratorEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(e) = self.handle(event).await {
                    error!(error = %e, "Workflow step failed");
                }
            }
            debug!("Local workflow driver stopped");
        })
    }

    pub async fn handle(&self, event: OrchestratorEvent) -> Result<(), ReviewError> {
        match event {
            OrchestratorEvent::Started { execution_id, input } => {
                let Some(key) = key_from(&input) else {
                    warn!(execution_id = %execution_id, "Execution input carries no workflow key");
                    return Ok(());
                };
                self.wait_for_record(&key, &execution_id).await?;
                let review_type = input.get("ReviewType").and_then(Value::as_str).unwrap_or_default();
                self.coordinator.validate_review_type(&key, review_type, None).await?;
                self.advance(&key, &execution_id).await
            }
            OrchestratorEvent::Resumed { execution_id, output, .. } => {
                let Some(key) = key_from(&output) else {
                    warn!(execution_id = %execution_id, "Resume output carries no workflow key");
                    return Ok(());
                };
                // The API update already recorded its own transition.
                debug!(
                    execution_id = %execution_id,
                    action = output.get("ResumedAction").and_then(serde_json::Value::as_str).unwrap_or_default(),
                    "Execution resumed"
                );
                self.advance(&key, &execution_id).await
            }
            OrchestratorEvent::Failed { execution_id, error_code, .. } => {
                info!(execution_id = %execution_id, error_code = %error_code, "Execution failed, nothing to drive");
                Ok(())
            }
        }
    }

    // The engine can start before the API call has persisted the record.
    async fn wait_for_record(&self, key: &WorkflowKey, execution_id: &str) -> Result<(), ReviewError> {
        for _ in 0..RECORD_POLL_ATTEMPTS {
            match self.coordinator.get_review(key).await {
                Ok(record) if record.execution_id.as_deref() == Some(execution_id) => return Ok(()),
                Ok(_) | Err(ReviewError::NotFound(_)) => tokio::time::sleep(RECORD_POLL_INTERVAL).await,
                Err(e) => return Err(e),
            }
        }
        Err(ReviewError::NotFound(key.clone()))
    }

    async fn advance(&self, key: &WorkflowKey, execution_id: &str) -> Result<(), ReviewError> {
        let report = self.coordinator.check_completion(key).await?;
        if !report.outcome.is_complete {
            let token = self.engine.issue_token(execution_id).await;
            self.coordinator.register_callback(key, &token, false).await?;
            return Ok(());
        }

        match self.coordinator.determine_loan_status(key).await {
            Ok(determined)
                if determined.status == LoanStatus::ReclassApproved
                    && !determined.record.is_reclass_confirmation =>
            {
                let token = self.engine.issue_token(execution_id).await;
                self.coordinator.register_callback(key, &token, true).await?;
                return Ok(());
            }
            Ok(_) => {}
            Err(ReviewError::Aggregation(e)) => {
                info!(workflow = %key, reason = %e, "No attribute decisions to aggregate");
            }
            Err(e) => return Err(e),
        }

        self.coordinator.complete_review(key).await?;
        Ok(())
    }
}
