// Workflow record persistence
// Records are upserted by (request number, loan number). The resume token is
// owned by `store_resume_token` / `take_resume_token`, never by `save`, so a
// stale record snapshot cannot bring a consumed token back.

use async_trait::async_trait;
use thiserror::Error;

use crate::workflows::{WorkflowKey, WorkflowRecord};

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use memory::InMemoryWorkflowRepository;
#[cfg(feature = "database")]
pub use sqlite::SqliteWorkflowRepository;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("No workflow record stored for {0}")]
    MissingRecord(WorkflowKey),

    #[error("Stored workflow record is corrupted: {reason}")]
    StateCorruption { reason: String },

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn find(&self, key: &WorkflowKey) -> Result<Option<WorkflowRecord>, PersistenceError>;

    /// Idempotent upsert. Inserting writes the record's resume token; updating
    /// keeps the stored one, except that completed records drop it.
    async fn save(&self, record: &WorkflowRecord) -> Result<(), PersistenceError>;

    async fn store_resume_token(
        &self,
        key: &WorkflowKey,
        token: &str,
        is_reclass_confirmation: bool,
    ) -> Result<(), PersistenceError>;

    /// Read and clear the stored resume token as one atomic step.
    async fn take_resume_token(&self, key: &WorkflowKey) -> Result<Option<String>, PersistenceError>;
}
