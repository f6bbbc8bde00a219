use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use tracing::{debug, info};

use super::{PersistenceError, WorkflowRepository};
use crate::config::DatabaseConfig;
use crate::workflows::{WorkflowKey, WorkflowRecord};

/// SQLite-backed repository. The record body is stored as JSON; the resume token
/// lives in its own column so it can be swapped atomically.
pub struct SqliteWorkflowRepository {
    pool: SqlitePool,
}

impl SqliteWorkflowRepository {
    /// Open (creating if needed) the database and optionally run migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        if !sqlx::Sqlite::database_exists(&config.url).await? {
            info!("Creating database at {}", config.url);
            sqlx::Sqlite::create_database(&config.url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        if config.auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connections closed");
    }
}

#[async_trait]
impl WorkflowRepository for SqliteWorkflowRepository {
    async fn find(&self, key: &WorkflowKey) -> Result<Option<WorkflowRecord>, PersistenceError> {
        let row = sqlx::query(
            r#"
            SELECT record_json, task_token, is_reclass_confirmation
            FROM workflow_states
            WHERE request_number = ?1 AND loan_number = ?2
            "#,
        )
        .bind(&key.request_number)
        .bind(&key.loan_number)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let body: String = row.get("record_json");
        let mut record: WorkflowRecord = serde_json::from_str(&body)?;
        if record.key() != *key {
            return Err(PersistenceError::StateCorruption {
                reason: format!("row for {} holds record for {}", key, record.key()),
            });
        }
        record.resume_token = row.get("task_token");
        record.is_reclass_confirmation = row.get::<i64, _>("is_reclass_confirmation") != 0;
        Ok(Some(record))
    }

    async fn save(&self, record: &WorkflowRecord) -> Result<(), PersistenceError> {
        let mut body = record.clone();
        let token = body.resume_token.take();
        let body = serde_json::to_string(&body)?;

        sqlx::query(
            r#"
            INSERT INTO workflow_states (
                request_number, loan_number, status, workflow_state_name,
                record_json, task_token, is_reclass_confirmation, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (request_number, loan_number) DO UPDATE SET
                status = excluded.status,
                workflow_state_name = excluded.workflow_state_name,
                record_json = excluded.record_json,
                is_reclass_confirmation = excluded.is_reclass_confirmation,
                updated_at = excluded.updated_at,
                task_token = CASE
                    WHEN excluded.status = 'COMPLETED' THEN NULL
                    ELSE workflow_states.task_token
                END
            "#,
        )
        .bind(&record.request_number)
        .bind(&record.loan_number)
        .bind(record.status().as_str())
        .bind(record.workflow_state_name.as_str())
        .bind(body)
        .bind(token)
        .bind(record.is_reclass_confirmation as i64)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(workflow = %record.key(), state = %record.workflow_state_name, "Saved workflow record");
        Ok(())
    }

    async fn store_resume_token(
        &self,
        key: &WorkflowKey,
        token: &str,
        is_reclass_confirmation: bool,
    ) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_states
            SET task_token = ?1, is_reclass_confirmation = ?2, updated_at = ?3
            WHERE request_number = ?4 AND loan_number = ?5
            "#,
        )
        .bind(token)
        .bind(is_reclass_confirmation as i64)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(&key.request_number)
        .bind(&key.loan_number)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::MissingRecord(key.clone()));
        }
        Ok(())
    }

    async fn take_resume_token(&self, key: &WorkflowKey) -> Result<Option<String>, PersistenceError> {
        let token = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE workflow_states
            SET task_token = NULL, updated_at = ?1
            WHERE request_number = ?2 AND loan_number = ?3 AND task_token IS NOT NULL
            RETURNING task_token
            "#,
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(&key.request_number)
        .bind(&key.loan_number)
        .fetch_optional(&self.pool)
        .await?;

        if token.is_some() {
            debug!(workflow = %key, "Took resume token");
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::{ReviewType, WorkflowStateName};

    async fn repository(dir: &tempfile::TempDir) -> SqliteWorkflowRepository {
        let url = format!("sqlite://{}", dir.path().join("workflows.db").display());
        SqliteWorkflowRepository::connect(&DatabaseConfig {
            url,
            max_connections: 4,
            auto_migrate: true,
        })
        .await
        .unwrap()
    }

    fn key() -> WorkflowKey {
        WorkflowKey::new("REQ-9", "0000000001")
    }

    #[tokio::test]
    async fn record_round_trips_with_its_transition_log() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir).await;

        let mut record = WorkflowRecord::new(key(), Some(ReviewType::SecPolicy), "reviewer");
        record.advance(WorkflowStateName::LoanDecisionUpdate, "reviewer").unwrap();
        repo.save(&record).await.unwrap();

        let found = repo.find(&key()).await.unwrap().unwrap();
        assert_eq!(found.transitions().len(), 2);
        assert_eq!(found.review_type, Some(ReviewType::SecPolicy));
        assert!(repo.find(&WorkflowKey::new("REQ-9", "0000000002")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resume_token_is_taken_once() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir).await;
        repo.save(&WorkflowRecord::new(key(), None, "System")).await.unwrap();
        repo.store_resume_token(&key(), "token-7", true).await.unwrap();

        let stale = repo.find(&key()).await.unwrap().unwrap();
        assert!(stale.is_reclass_confirmation);

        assert_eq!(repo.take_resume_token(&key()).await.unwrap().as_deref(), Some("token-7"));
        repo.save(&stale).await.unwrap();
        assert_eq!(repo.take_resume_token(&key()).await.unwrap(), None);
        repo.close().await;
    }

    #[tokio::test]
    async fn concurrent_takes_hand_out_the_token_once() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir).await;
        repo.save(&WorkflowRecord::new(key(), None, "System")).await.unwrap();
        repo.store_resume_token(&key(), "token-8", false).await.unwrap();

        let key = key();
        let takes = futures::future::join_all((0..8).map(|_| repo.take_resume_token(&key))).await;
        let taken: Vec<String> = takes.into_iter().filter_map(|take| take.unwrap()).collect();
        assert_eq!(taken, vec!["token-8".to_string()]);

        let missing = WorkflowKey::new("REQ-9", "0000000002");
        assert_eq!(repo.take_resume_token(&missing).await.unwrap(), None);
        repo.close().await;
    }
}
