use super::task_executor::{StepError, TaskExecutor, TaskInput, TaskOutcome};
use crate::constants::{executors, pointers};
use crate::error::ErrorCode;
use crate::reconciler::{EndpointStateReconciler, ReconcileError};
use async_trait::async_trait;
use std::sync::Arc;

impl From<ReconcileError> for StepError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::Collaborator(inner) => inner.into(),
            other @ ReconcileError::ModifiedConcurrently { .. } => {
                StepError::new(ErrorCode::TaskFailed, other.to_string())
            }
        }
    }
}

/// Runs the reconciler for the submitted endpoint and the freshly registered model.
///
/// A busy endpoint is not an error here; the plan's `status` drives the Choice step
/// that follows. Configurations are keyed to the execution, so a retried attempt picks up
/// whatever the failed one already created.
#[derive(Debug)]
pub struct PrepareDeploymentExecutor {
    reconciler: Arc<EndpointStateReconciler>,
}

impl PrepareDeploymentExecutor {
    pub fn new(reconciler: Arc<EndpointStateReconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl TaskExecutor for PrepareDeploymentExecutor {
    fn name(&self) -> &str {
        executors::PREPARE_DEPLOYMENT
    }

    async fn execute(&self, input: TaskInput<'_>) -> Result<TaskOutcome, StepError> {
        let endpoint_name = input.require_str(pointers::ENDPOINT_NAME)?;
        let model_name = input.require_str(pointers::REGISTERED_MODEL_NAME)?;

        let plan = self
            .reconciler
            .reconcile(input.execution_id, endpoint_name, model_name)
            .await?;
        let output = serde_json::to_value(&plan)
            .map_err(|e| StepError::failed(format!("unserializable deployment plan: {e}")))?;
        Ok(TaskOutcome::Completed(output))
    }
}
