//! # Execution Handlers
//!
//! Submission and status of promotion pipeline executions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::PromoterError;
use crate::models::{Execution, ExecutionFailure};
use crate::web::errors::ApiResult;
use crate::web::state::AppState;

/// Fields every submission document must carry
pub const REQUIRED_FIELDS: &[&str] = &["endpoint_name", "model", "training_job"];

#[derive(Debug, Deserialize)]
pub struct SubmitExecutionRequest {
    pub context: Value,
}

#[derive(Debug, Serialize)]
pub struct SubmitExecutionResponse {
    pub execution_id: Uuid,
    pub pipeline: String,
}

#[derive(Debug, Serialize)]
pub struct ExecutionResponse {
    pub execution_id: Uuid,
    pub pipeline: String,
    pub status: String,
    pub current_step: Option<String>,
    pub attempt: u32,
    pub awaiting_callback: bool,
    pub error: Option<ExecutionFailure>,
    pub context: Value,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<Execution> for ExecutionResponse {
    fn from(execution: Execution) -> Self {
        Self {
            pipeline: execution.pipeline_key(),
            status: execution.status.to_string(),
            awaiting_callback: execution.pending_token.is_some(),
            execution_id: execution.execution_id,
            current_step: execution.current_step,
            attempt: execution.attempt,
            error: execution.error,
            context: execution.context,
            started_at: execution.started_at,
            updated_at: execution.updated_at,
            ended_at: execution.ended_at,
        }
    }
}

/// Reject submissions missing a required top-level field
pub fn validate_submission(context: &Value) -> Result<(), PromoterError> {
    let Some(document) = context.as_object() else {
        return Err(PromoterError::InvalidSubmission(
            "context must be a JSON object".to_string(),
        ));
    };
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| document.get(*field).map_or(true, Value::is_null))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PromoterError::InvalidSubmission(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// Submit an execution: POST /v1/executions
pub async fn submit_execution(
    State(state): State<AppState>,
    Json(request): Json<SubmitExecutionRequest>,
) -> ApiResult<(StatusCode, Json<SubmitExecutionResponse>)> {
    validate_submission(&request.context)?;

    let execution_id = state.engine.submit(&state.pipeline, request.context).await?;
    info!(execution_id = %execution_id, pipeline = %state.pipeline.key(), "Execution submitted");

    Ok((
        StatusCode::CREATED,
        Json(SubmitExecutionResponse {
            execution_id,
            pipeline: state.pipeline.key(),
        }),
    ))
}

/// Execution status: GET /v1/executions/{execution_id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
) -> ApiResult<Json<ExecutionResponse>> {
    let execution = state.engine.get_status(execution_id).await?;
    Ok(Json(execution.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::errors::ApiError;
    use serde_json::json;

    #[test]
    fn test_submission_validation() {
        assert!(validate_submission(&json!({
            "endpoint_name": "churn",
            "model": {},
            "training_job": {}
        }))
        .is_ok());

        let err =
            validate_submission(&json!({"endpoint_name": "churn", "model": null})).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("model"));
        assert!(message.contains("training_job"));

        assert!(validate_submission(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_api_error_conversion() {
        let err: ApiError = validate_submission(&json!({})).unwrap_err().into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
