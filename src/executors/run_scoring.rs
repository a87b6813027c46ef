use super::task_executor::{StepError, TaskExecutor, TaskInput, TaskOutcome};
use crate::collaborators::ScoringService;
use crate::constants::{executors, pointers};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Batch-scores the registered model against `/input/test_dataset_uri`
#[derive(Debug)]
pub struct RunScoringExecutor {
    scoring: Arc<dyn ScoringService>,
}

impl RunScoringExecutor {
    pub fn new(scoring: Arc<dyn ScoringService>) -> Self {
        Self { scoring }
    }
}

#[async_trait]
impl TaskExecutor for RunScoringExecutor {
    fn name(&self) -> &str {
        executors::RUN_SCORING
    }

    async fn execute(&self, input: TaskInput<'_>) -> Result<TaskOutcome, StepError> {
        let model_name = input.require_str(pointers::REGISTERED_MODEL_NAME)?;
        let dataset_uri = input.require_str(pointers::TEST_DATASET_URI)?;

        let job = self.scoring.run_batch(model_name, dataset_uri).await?;
        info!(
            execution_id = %input.execution_id,
            model_name = %model_name,
            job = ?job.get("job_name"),
            "Batch scoring completed"
        );
        Ok(TaskOutcome::Completed(job))
    }
}
