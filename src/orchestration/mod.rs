//! Boundary to the external workflow engine.
//!
//! The engine owns executions and the single-use task tokens that resume them.
//! Only the façade trait lives here plus an in-process implementation used by
//! tests and the local runner; the engine's wire protocol is out of scope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod driver;
mod memory;

pub use driver::LocalWorkflowDriver;
pub use memory::{InMemoryOrchestrator, OrchestratorEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("Task token is unknown or was already used: {0}")]
    InvalidToken(String),

    #[error("Execution already exists: {0}")]
    ExecutionAlreadyExists(String),

    #[error("Workflow engine unavailable: {0}")]
    Unavailable(String),
}

/// Handle of a started execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHandle {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn start_execution(
        &self,
        definition_id: &str,
        execution_name: &str,
        input: serde_json::Value,
    ) -> Result<ExecutionHandle, OrchestrationError>;

    /// Resume the execution paused on `token`. A token resumes at most once.
    async fn resume(&self, token: &str, output: serde_json::Value) -> Result<(), OrchestrationError>;

    async fn fail(&self, token: &str, error_code: &str, cause: &str) -> Result<(), OrchestrationError>;
}

/// `<prefix>-<request number>-<8 hex chars>`
pub fn execution_name(prefix: &str, request_number: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, request_number, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_names_are_prefixed_and_unique() {
        let first = execution_name("ldc-loan-review", "REQ-1");
        let second = execution_name("ldc-loan-review", "REQ-1");
        assert!(first.starts_with("ldc-loan-review-REQ-1-"));
        assert_eq!(first.len(), "ldc-loan-review-REQ-1-".len() + 8);
        assert_ne!(first, second);
    }
}
