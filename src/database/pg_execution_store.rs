use super::error::{StoreError, StoreResult};
use super::execution_store::ExecutionStore;
use crate::error::ErrorCode;
use crate::models::{Execution, ExecutionFailure};
use crate::state_machine::ExecutionStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// PostgreSQL-backed execution store
#[derive(Debug, Clone)]
pub struct PgExecutionStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct ExecutionRow {
    execution_id: Uuid,
    pipeline_name: String,
    pipeline_version: String,
    current_step: Option<String>,
    attempt: i32,
    context: Value,
    status: String,
    pending_token: Option<String>,
    error_code: Option<String>,
    error_cause: Option<String>,
    error_step: Option<String>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ExecutionStatus>()
            .map_err(StoreError::CorruptRecord)?;

        let error = match row.error_code {
            Some(code) => Some(ExecutionFailure {
                code: code.parse::<ErrorCode>().map_err(StoreError::CorruptRecord)?,
                cause: row.error_cause.unwrap_or_default(),
                step: row.error_step,
            }),
            None => None,
        };

        Ok(Execution {
            execution_id: row.execution_id,
            pipeline_name: row.pipeline_name,
            pipeline_version: row.pipeline_version,
            current_step: row.current_step,
            attempt: u32::try_from(row.attempt).unwrap_or_default(),
            context: row.context,
            status,
            pending_token: row.pending_token,
            error,
            started_at: row.started_at,
            updated_at: row.updated_at,
            ended_at: row.ended_at,
        })
    }
}

const SELECT_EXECUTION: &str = r#"
    SELECT execution_id, pipeline_name, pipeline_version, current_step, attempt, context,
           status, pending_token, error_code, error_cause, error_step,
           started_at, updated_at, ended_at
    FROM promoter_executions
"#;

impl PgExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn create(&self, execution: &Execution) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO promoter_executions (
                execution_id, pipeline_name, pipeline_version, current_step, attempt, context,
                status, pending_token, error_code, error_cause, error_step,
                started_at, updated_at, ended_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (execution_id) DO NOTHING
            "#,
        )
        .bind(execution.execution_id)
        .bind(&execution.pipeline_name)
        .bind(&execution.pipeline_version)
        .bind(&execution.current_step)
        .bind(execution.attempt as i32)
        .bind(&execution.context)
        .bind(execution.status.as_str())
        .bind(&execution.pending_token)
        .bind(execution.error.as_ref().map(|e| e.code.as_str()))
        .bind(execution.error.as_ref().map(|e| e.cause.clone()))
        .bind(execution.error.as_ref().and_then(|e| e.step.clone()))
        .bind(execution.started_at)
        .bind(execution.updated_at)
        .bind(execution.ended_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateExecution(execution.execution_id));
        }
        Ok(())
    }

    async fn save(&self, execution: &Execution) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE promoter_executions
            SET current_step = $2, attempt = $3, context = $4, status = $5, pending_token = $6,
                error_code = $7, error_cause = $8, error_step = $9,
                updated_at = $10, ended_at = $11
            WHERE execution_id = $1
            "#,
        )
        .bind(execution.execution_id)
        .bind(&execution.current_step)
        .bind(execution.attempt as i32)
        .bind(&execution.context)
        .bind(execution.status.as_str())
        .bind(&execution.pending_token)
        .bind(execution.error.as_ref().map(|e| e.code.as_str()))
        .bind(execution.error.as_ref().map(|e| e.cause.clone()))
        .bind(execution.error.as_ref().and_then(|e| e.step.clone()))
        .bind(execution.updated_at)
        .bind(execution.ended_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ExecutionNotFound(execution.execution_id));
        }
        Ok(())
    }

    async fn load(&self, execution_id: Uuid) -> StoreResult<Option<Execution>> {
        let row = sqlx::query_as::<_, ExecutionRow>(&format!(
            "{SELECT_EXECUTION} WHERE execution_id = $1"
        ))
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Execution::try_from).transpose()
    }

    async fn suspended_ids(&self) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT execution_id FROM promoter_executions WHERE status = $1",
        )
        .bind(ExecutionStatus::Suspended.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn running_ids(&self) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT execution_id FROM promoter_executions WHERE status = $1 ORDER BY started_at",
        )
        .bind(ExecutionStatus::Running.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_round_trip_through_postgres(pool: PgPool) {
        let store = PgExecutionStore::new(pool);
        let mut execution =
            Execution::new("promotion", "1", "RegisterModel", json!({"a": 1}), Utc::now());
        store.create(&execution).await.unwrap();

        execution.status = ExecutionStatus::Failed;
        execution.error = Some(ExecutionFailure {
            code: ErrorCode::ApprovalRejected,
            cause: "approval rejected by reviewer".to_string(),
            step: Some("RequestApproval".to_string()),
        });
        store.save(&execution).await.unwrap();

        let loaded = store.load(execution.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Failed);
        assert_eq!(loaded.error, execution.error);
        assert_eq!(loaded.context, execution.context);
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_duplicate_create_is_rejected(pool: PgPool) {
        let store = PgExecutionStore::new(pool);
        let execution = Execution::new("promotion", "1", "RegisterModel", json!({}), Utc::now());
        store.create(&execution).await.unwrap();
        assert!(matches!(
            store.create(&execution).await,
            Err(StoreError::DuplicateExecution(_))
        ));
    }
}
