use super::task_executor::{StepError, TaskExecutor, TaskInput, TaskOutcome};
use crate::collaborators::ServingTarget;
use crate::constants::{executors, pointers};
use crate::error::ErrorCode;
use crate::orchestration::{CanaryHealthPolicy, CanaryVerdict};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Judges the canary after its monitoring window; an unhealthy verdict stops the rollout
/// before traffic is shifted.
#[derive(Debug)]
pub struct EvaluateCanaryExecutor {
    target: Arc<dyn ServingTarget>,
    policy: Arc<dyn CanaryHealthPolicy>,
}

impl EvaluateCanaryExecutor {
    pub fn new(target: Arc<dyn ServingTarget>, policy: Arc<dyn CanaryHealthPolicy>) -> Self {
        Self { target, policy }
    }
}

#[async_trait]
impl TaskExecutor for EvaluateCanaryExecutor {
    fn name(&self) -> &str {
        executors::EVALUATE_CANARY
    }

    async fn execute(&self, input: TaskInput<'_>) -> Result<TaskOutcome, StepError> {
        let endpoint_name = input.require_str(pointers::ENDPOINT_NAME)?;
        let endpoint = self.target.describe(endpoint_name).await?.ok_or_else(|| {
            StepError::new(
                ErrorCode::EndpointUpdateFailed,
                format!("endpoint {endpoint_name} disappeared during canary"),
            )
        })?;

        match self.policy.evaluate(&endpoint, input.context).await? {
            CanaryVerdict::Healthy => {
                info!(
                    execution_id = %input.execution_id,
                    endpoint = %endpoint_name,
                    policy = %self.policy.name(),
                    "Canary healthy"
                );
                Ok(TaskOutcome::Completed(json!({
                    "verdict": "Healthy",
                    "policy": self.policy.name(),
                    "endpoint_name": endpoint_name,
                })))
            }
            CanaryVerdict::Unhealthy(reason) => {
                warn!(
                    execution_id = %input.execution_id,
                    endpoint = %endpoint_name,
                    policy = %self.policy.name(),
                    reason = %reason,
                    "Canary unhealthy"
                );
                Err(StepError::failed(format!("canary unhealthy: {reason}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        CollaboratorResult, EndpointConfiguration, EndpointDescription, InMemoryServingTarget,
        ProductionVariant,
    };
    use crate::orchestration::PassThroughPolicy;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    #[derive(Debug)]
    struct AlwaysUnhealthy;

    #[async_trait]
    impl CanaryHealthPolicy for AlwaysUnhealthy {
        fn name(&self) -> &str {
            "always_unhealthy"
        }

        async fn evaluate(
            &self,
            _endpoint: &EndpointDescription,
            _context: &Value,
        ) -> CollaboratorResult<CanaryVerdict> {
            Ok(CanaryVerdict::Unhealthy("error rate 12% above 1% threshold".into()))
        }
    }

    fn target() -> Arc<InMemoryServingTarget> {
        let target = Arc::new(InMemoryServingTarget::default());
        target.seed_endpoint(
            "churn",
            EndpointConfiguration {
                name: "cfg".into(),
                variants: vec![ProductionVariant {
                    variant_name: "blue".into(),
                    model_name: "m".into(),
                    instance_type: "ml.m5.large".into(),
                    initial_instance_count: 1,
                    initial_variant_weight: 1.0,
                }],
                data_capture: None,
                tags: BTreeMap::new(),
            },
            "InService",
        );
        target
    }

    async fn run(executor: &EvaluateCanaryExecutor) -> Result<TaskOutcome, StepError> {
        let context = json!({"input": {"endpoint_name": "churn"}});
        let parameters = Value::Null;
        executor
            .execute(TaskInput {
                execution_id: Uuid::new_v4(),
                step_name: "EvaluateCanary",
                attempt: 1,
                parameters: &parameters,
                context: &context,
            })
            .await
    }

    #[tokio::test]
    async fn test_pass_through_policy_approves() {
        let executor = EvaluateCanaryExecutor::new(target(), Arc::new(PassThroughPolicy));
        let TaskOutcome::Completed(output) = run(&executor).await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(output["verdict"], "Healthy");
    }

    #[tokio::test]
    async fn test_unhealthy_verdict_fails_step() {
        let executor = EvaluateCanaryExecutor::new(target(), Arc::new(AlwaysUnhealthy));
        let err = run(&executor).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskFailed);
        assert_eq!(err.message, "canary unhealthy: error rate 12% above 1% threshold");
    }
}
