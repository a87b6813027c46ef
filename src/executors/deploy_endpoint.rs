use super::task_executor::{StepError, TaskExecutor, TaskInput, TaskOutcome};
use crate::collaborators::ServingTarget;
use crate::constants::{executors, pointers};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Which serving-target call an endpoint step makes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointMutation {
    Create,
    Update,
}

#[derive(Debug, Deserialize)]
struct DeployEndpointParameters {
    /// Context pointer to the configuration name to apply
    #[serde(default = "default_config_pointer")]
    config_pointer: String,
}

fn default_config_pointer() -> String {
    pointers::TARGET_CONFIG_NAME.to_string()
}

/// Points `/input/endpoint_name` at a prepared configuration
#[derive(Debug)]
pub struct DeployEndpointExecutor {
    target: Arc<dyn ServingTarget>,
    mutation: EndpointMutation,
}

impl DeployEndpointExecutor {
    pub fn create(target: Arc<dyn ServingTarget>) -> Self {
        Self {
            target,
            mutation: EndpointMutation::Create,
        }
    }

    pub fn update(target: Arc<dyn ServingTarget>) -> Self {
        Self {
            target,
            mutation: EndpointMutation::Update,
        }
    }
}

#[async_trait]
impl TaskExecutor for DeployEndpointExecutor {
    fn name(&self) -> &str {
        match self.mutation {
            EndpointMutation::Create => executors::CREATE_ENDPOINT,
            EndpointMutation::Update => executors::UPDATE_ENDPOINT,
        }
    }

    async fn execute(&self, input: TaskInput<'_>) -> Result<TaskOutcome, StepError> {
        let parameters: DeployEndpointParameters = input.parameters_as()?;
        let endpoint_name = input.require_str(pointers::ENDPOINT_NAME)?;
        let config_name = input.require_str(&parameters.config_pointer)?;

        let endpoint_arn = match self.mutation {
            EndpointMutation::Create => {
                self.target.create_endpoint(endpoint_name, config_name).await?
            }
            EndpointMutation::Update => {
                self.target.update_endpoint(endpoint_name, config_name).await?
            }
        };

        info!(
            execution_id = %input.execution_id,
            endpoint = %endpoint_name,
            config = %config_name,
            mutation = ?self.mutation,
            "Applied endpoint configuration"
        );
        Ok(TaskOutcome::Completed(json!({
            "endpoint_name": endpoint_name,
            "endpoint_arn": endpoint_arn,
            "config_name": config_name,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{EndpointConfiguration, InMemoryServingTarget, ProductionVariant};
    use crate::error::ErrorCode;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn configuration(name: &str) -> EndpointConfiguration {
        EndpointConfiguration {
            name: name.into(),
            variants: vec![ProductionVariant {
                variant_name: "blue".into(),
                model_name: "m".into(),
                instance_type: "ml.m5.large".into(),
                initial_instance_count: 1,
                initial_variant_weight: 1.0,
            }],
            data_capture: None,
            tags: BTreeMap::new(),
        }
    }

    async fn run(
        executor: &DeployEndpointExecutor,
        parameters: Value,
    ) -> Result<TaskOutcome, StepError> {
        let context = json!({
            "input": {"endpoint_name": "churn"},
            "deployment": {
                "target_config": {"name": "cfg-target"},
                "canary_config": {"name": "cfg-canary"}
            }
        });
        executor
            .execute(TaskInput {
                execution_id: Uuid::new_v4(),
                step_name: "Deploy",
                attempt: 1,
                parameters: &parameters,
                context: &context,
            })
            .await
    }

    #[tokio::test]
    async fn test_create_uses_target_config_by_default() {
        let target = Arc::new(InMemoryServingTarget::default());
        target.create_configuration(&configuration("cfg-target")).await.unwrap();

        let executor = DeployEndpointExecutor::create(target.clone());
        assert_eq!(executor.name(), executors::CREATE_ENDPOINT);
        run(&executor, Value::Null).await.unwrap();

        assert_eq!(target.peek("churn").unwrap().config_name, "cfg-target");
    }

    #[tokio::test]
    async fn test_update_follows_config_pointer() {
        let target = Arc::new(InMemoryServingTarget::default());
        target.seed_endpoint("churn", configuration("cfg-live"), "InService");
        target.create_configuration(&configuration("cfg-canary")).await.unwrap();

        let executor = DeployEndpointExecutor::update(target.clone());
        run(&executor, json!({"config_pointer": pointers::CANARY_CONFIG_NAME}))
            .await
            .unwrap();

        let endpoint = target.peek("churn").unwrap();
        assert_eq!(endpoint.config_name, "cfg-canary");
        assert_eq!(endpoint.status, "Updating");
    }

    #[tokio::test]
    async fn test_update_of_missing_endpoint_fails() {
        let target = Arc::new(InMemoryServingTarget::default());
        target.create_configuration(&configuration("cfg-target")).await.unwrap();
        let err = run(&DeployEndpointExecutor::update(target), Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskFailed);
    }
}
