use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use super::{ExecutionHandle, OrchestrationError, Orchestrator};

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    Started {
        execution_id: String,
        input: serde_json::Value,
    },
    Resumed {
        execution_id: String,
        token: String,
        output: serde_json::Value,
    },
    Failed {
        execution_id: String,
        token: String,
        error_code: String,
        cause: String,
    },
}

#[derive(Default)]
struct EngineState {
    executions: HashSet<String>,
    // token -> execution id, for tokens not yet used
    open_tokens: HashMap<String, String>,
    used_tokens: HashSet<String>,
    events: Vec<OrchestratorEvent>,
    subscribers: Vec<mpsc::UnboundedSender<OrchestratorEvent>>,
    // Set while the engine refuses calls; tokens are left untouched.
    outage: Option<String>,
}

impl EngineState {
    fn ensure_available(&self) -> Result<(), OrchestrationError> {
        match &self.outage {
            Some(reason) => Err(OrchestrationError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn consume(&mut self, token: &str) -> Result<String, OrchestrationError> {
        match self.open_tokens.remove(token) {
            Some(execution_id) => {
                self.used_tokens.insert(token.to_string());
                Ok(execution_id)
            }
            None => Err(OrchestrationError::InvalidToken(token.to_string())),
        }
    }

    fn publish(&mut self, event: OrchestratorEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        self.events.push(event);
    }
}

/// In-process stand-in for the workflow engine that enforces single-use tokens
#[derive(Default)]
pub struct InMemoryOrchestrator {
    state: Mutex<EngineState>,
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause `execution_id` on a new task token, as the engine does when it
    /// reaches a wait-for-callback step.
    pub async fn issue_token(&self, execution_id: &str) -> String {
        let token = format!("task-{}", Uuid::new_v4().simple());
        self.state
            .lock()
            .await
            .open_tokens
            .insert(token.clone(), execution_id.to_string());
        token
    }

    /// Stream of engine events published after subscribing
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<OrchestratorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().await.subscribers.push(tx);
        rx
    }

    pub async fn events(&self) -> Vec<OrchestratorEvent> {
        self.state.lock().await.events.clone()
    }

    pub async fn is_token_used(&self, token: &str) -> bool {
        self.state.lock().await.used_tokens.contains(token)
    }

    /// Refuse every call with `Unavailable(reason)` until `set_available`
    pub async fn set_unavailable(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "Workflow engine marked unavailable");
        self.state.lock().await.outage = Some(reason);
    }

    pub async fn set_available(&self) {
        self.state.lock().await.outage = None;
    }
}

#[async_trait]
impl Orchestrator for InMemoryOrchestrator {
    async fn start_execution(
        &self,
        definition_id: &str,
        execution_name: &str,
        input: serde_json::Value,
    ) -> Result<ExecutionHandle, OrchestrationError> {
        let execution_id = format!("{}:{}", definition_id, execution_name);
        let mut state = self.state.lock().await;
        state.ensure_available()?;
        if !state.executions.insert(execution_id.clone()) {
            return Err(OrchestrationError::ExecutionAlreadyExists(execution_id));
        }

        info!(execution_id = %execution_id, "Started workflow execution");
        state.publish(OrchestratorEvent::Started {
            execution_id: execution_id.clone(),
            input,
        });
        Ok(ExecutionHandle {
            execution_id,
            started_at: Utc::now(),
        })
    }

    async fn resume(&self, token: &str, output: serde_json::Value) -> Result<(), OrchestrationError> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;
        let execution_id = state.consume(token).inspect_err(|_| {
            warn!("Rejected resume with unknown or used task token");
        })?;

        info!(execution_id = %execution_id, "Resumed workflow execution");
        state.publish(OrchestratorEvent::Resumed {
            execution_id,
            token: token.to_string(),
            output,
        });
        Ok(())
    }

    async fn fail(&self, token: &str, error_code: &str, cause: &str) -> Result<(), OrchestrationError> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;
        let execution_id = state.consume(token)?;

        warn!(execution_id = %execution_id, error_code, cause, "Failed workflow execution");
        state.publish(OrchestratorEvent::Failed {
            execution_id,
            token: token.to_string(),
            error_code: error_code.to_string(),
            cause: cause.to_string(),
        });
        Ok(())
    }
}
