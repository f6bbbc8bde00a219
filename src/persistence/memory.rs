use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{PersistenceError, WorkflowRepository};
use crate::workflows::{ExecutionStatus, WorkflowKey, WorkflowRecord};

/// Process-local repository, used by tests and the local CLI runner
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    records: RwLock<HashMap<WorkflowKey, WorkflowRecord>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn find(&self, key: &WorkflowKey) -> Result<Option<WorkflowRecord>, PersistenceError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn save(&self, record: &WorkflowRecord) -> Result<(), PersistenceError> {
        let key = record.key();
        let mut records = self.records.write().await;

        let mut stored = record.clone();
        if let Some(existing) = records.get(&key) {
            stored.resume_token = existing.resume_token.clone();
        }
        if stored.status() == ExecutionStatus::Completed {
            stored.resume_token = None;
        }

        debug!(workflow = %key, state = %stored.workflow_state_name, "Saved workflow record");
        records.insert(key, stored);
        Ok(())
    }

    async fn store_resume_token(
        &self,
        key: &WorkflowKey,
        token: &str,
        is_reclass_confirmation: bool,
    ) -> Result<(), PersistenceError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| PersistenceError::MissingRecord(key.clone()))?;
        record.resume_token = Some(token.to_string());
        record.is_reclass_confirmation = is_reclass_confirmation;
        record.touch();
        Ok(())
    }

    async fn take_resume_token(&self, key: &WorkflowKey) -> Result<Option<String>, PersistenceError> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(key).and_then(|record| record.resume_token.take()))
    }
}
