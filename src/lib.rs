// Loan Review Workflow Library
// Bridges a synchronous review API with an asynchronously orchestrated workflow engine

pub mod callback;
pub mod config;
pub mod coordinator;
pub mod handlers;
pub mod integration;
pub mod notifications;
pub mod observability;
pub mod orchestration;
pub mod persistence;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use callback::{CallbackBridge, CallbackError, PendingCallback};
pub use crate::config::{config, LoanReviewConfig};
pub use coordinator::{
    AttributeInput, CallbackOutcome, DecisionUpdateRequest, ReviewCoordinator, ReviewError,
    ReviewTypeUpdateRequest, StartReviewRequest, UpdateOutcome,
};
pub use handlers::LoanReviewRouter;
pub use integration::{HttpPpaClient, PpaClient, PpaOutcome};
pub use notifications::{NotificationChannel, QueueNotificationChannel, TracingNotificationChannel};
pub use observability::{create_workflow_span, CallbackMetrics, OperationTimer};
pub use orchestration::{InMemoryOrchestrator, Orchestrator, OrchestrationError};
pub use persistence::{InMemoryWorkflowRepository, PersistenceError, WorkflowRepository};
pub use telemetry::{generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use workflows::{
    determine_status, evaluate, AttributeDecision, CompletionOutcome, DecisionValue,
    ExecutionStatus, LoanStatus, ReviewType, WorkflowKey, WorkflowRecord, WorkflowStateName,
};
