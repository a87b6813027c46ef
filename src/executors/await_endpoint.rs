//! # Endpoint Polling
//!
//! Waits for an endpoint to leave its transitional status after a create or update.
//! Status sets are configurable per step; by default any busy status keeps the poll going
//! and `Failed` ends it at once with `EndpointUpdateFailed`.

use super::task_executor::{StepError, TaskExecutor, TaskInput, TaskOutcome};
use crate::collaborators::{EndpointDescription, ServingTarget};
use crate::constants::{executors, pointers, DEFAULT_BUSY_STATES, DEFAULT_FAIL_STATES};
use crate::error::ErrorCode;
use crate::resilience::{PollError, PollPolicy, PollScheduler, PollVerdict};
use crate::utils::serde::{deserialize_optional_string_list, deserialize_optional_u64};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
struct AwaitEndpointParameters {
    #[serde(default, deserialize_with = "deserialize_optional_string_list")]
    busy_states: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_string_list")]
    fail_states: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_string_list")]
    target_states: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    max_attempts: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    interval_seconds: Option<u64>,
}

/// Status classification for one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSets {
    pub busy: Vec<String>,
    pub fail: Vec<String>,
    /// When set, a settled status outside this set is a failure
    pub target: Option<Vec<String>>,
}

impl Default for StatusSets {
    fn default() -> Self {
        Self {
            busy: DEFAULT_BUSY_STATES.iter().map(|s| s.to_string()).collect(),
            fail: DEFAULT_FAIL_STATES.iter().map(|s| s.to_string()).collect(),
            target: None,
        }
    }
}

impl StatusSets {
    pub fn classify(
        &self,
        endpoint_name: &str,
        description: Option<&EndpointDescription>,
    ) -> PollVerdict {
        let Some(endpoint) = description else {
            return PollVerdict::Abort(format!("endpoint {endpoint_name} does not exist"));
        };
        let status = endpoint.status.as_str();

        if self.busy.iter().any(|s| s == status) {
            PollVerdict::Continue
        } else if self.fail.iter().any(|s| s == status) {
            PollVerdict::Abort(format!("endpoint {endpoint_name} entered status {status}"))
        } else if self
            .target
            .as_ref()
            .is_some_and(|target| !target.iter().any(|s| s == status))
        {
            PollVerdict::Abort(format!(
                "endpoint {endpoint_name} settled in unexpected status {status}"
            ))
        } else {
            PollVerdict::Done
        }
    }
}

#[derive(Debug)]
pub struct AwaitEndpointExecutor {
    target: Arc<dyn ServingTarget>,
    scheduler: PollScheduler,
    default_policy: PollPolicy,
}

impl AwaitEndpointExecutor {
    pub fn new(target: Arc<dyn ServingTarget>, default_policy: PollPolicy) -> Self {
        Self {
            target,
            scheduler: PollScheduler::new(),
            default_policy,
        }
    }
}

#[async_trait]
impl TaskExecutor for AwaitEndpointExecutor {
    fn name(&self) -> &str {
        executors::AWAIT_ENDPOINT
    }

    async fn execute(&self, input: TaskInput<'_>) -> Result<TaskOutcome, StepError> {
        let parameters: AwaitEndpointParameters = input.parameters_as()?;
        let endpoint_name = input.require_str(pointers::ENDPOINT_NAME)?;

        let defaults = StatusSets::default();
        let sets = StatusSets {
            busy: parameters.busy_states.unwrap_or(defaults.busy),
            fail: parameters.fail_states.unwrap_or(defaults.fail),
            target: parameters.target_states,
        };
        let policy = PollPolicy::new(
            parameters
                .max_attempts
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                .unwrap_or(self.default_policy.max_attempts),
            parameters
                .interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(self.default_policy.interval),
        );

        let result = self
            .scheduler
            .poll_until(
                policy,
                || self.target.describe(endpoint_name),
                |snapshot| sets.classify(endpoint_name, snapshot.as_ref()),
            )
            .await;

        match result {
            Ok(Some(endpoint)) => {
                info!(
                    execution_id = %input.execution_id,
                    endpoint = %endpoint_name,
                    status = %endpoint.status,
                    "Endpoint settled"
                );
                let output = serde_json::to_value(&endpoint).map_err(|e| {
                    StepError::failed(format!("unserializable endpoint description: {e}"))
                })?;
                Ok(TaskOutcome::Completed(output))
            }
            Ok(None) => Err(StepError::new(
                ErrorCode::EndpointUpdateFailed,
                format!("endpoint {endpoint_name} does not exist"),
            )),
            Err(PollError::Aborted { reason, .. }) => {
                Err(StepError::new(ErrorCode::EndpointUpdateFailed, reason))
            }
            Err(e @ PollError::AttemptsExhausted { .. }) => Err(StepError::new(
                ErrorCode::AttemptsExhausted,
                format!("endpoint {endpoint_name}: {e}"),
            )),
            Err(PollError::Check(e)) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        CollaboratorError, EndpointConfiguration, InMemoryServingTarget, ProductionVariant,
    };
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn seeded(status: &str) -> Arc<InMemoryServingTarget> {
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
            status,
        );
        target
    }

    async fn run(
        target: Arc<InMemoryServingTarget>,
        parameters: Value,
    ) -> Result<TaskOutcome, StepError> {
        let policy = PollPolicy::new(5, Duration::from_secs(30));
        let executor = AwaitEndpointExecutor::new(target, policy);
        let context = json!({"input": {"endpoint_name": "churn"}});
        executor
            .execute(TaskInput {
                execution_id: Uuid::new_v4(),
                step_name: "AwaitEndpoint",
                attempt: 1,
                parameters: &parameters,
                context: &context,
            })
            .await
    }

    #[test]
    fn test_classification() {
        let sets = StatusSets::default();
        let endpoint = |status: &str| EndpointDescription {
            endpoint_name: "churn".into(),
            status: status.into(),
            config_name: "cfg".into(),
            variants: vec![],
        };
        assert_eq!(sets.classify("churn", Some(&endpoint("Updating"))), PollVerdict::Continue);
        assert_eq!(sets.classify("churn", Some(&endpoint("InService"))), PollVerdict::Done);
        assert!(matches!(sets.classify("churn", Some(&endpoint("Failed"))), PollVerdict::Abort(_)));
        assert!(matches!(sets.classify("churn", None), PollVerdict::Abort(_)));

        let strict = StatusSets {
            target: Some(vec!["InService".into()]),
            ..StatusSets::default()
        };
        assert!(matches!(
            strict.classify("churn", Some(&endpoint("OutOfService"))),
            PollVerdict::Abort(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_in_service() {
        let target = seeded("InService");
        target.script_statuses("churn", &["Updating", "Updating", "InService"]);

        let started = tokio::time::Instant::now();
        let TaskOutcome::Completed(endpoint) = run(target, Value::Null).await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(endpoint["status"], "InService");
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_short_circuits() {
        let target = seeded("InService");
        target.script_statuses("churn", &["Updating", "Failed", "InService"]);

        let started = tokio::time::Instant::now();
        let err = run(target, Value::Null).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EndpointUpdateFailed);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_uses_step_parameters() {
        let target = seeded("Updating");
        let err = run(target, json!({"max_attempts": "3", "interval_seconds": 10}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AttemptsExhausted);
    }

    #[tokio::test]
    async fn test_missing_endpoint_fails() {
        let err = run(Arc::new(InMemoryServingTarget::default()), Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::EndpointUpdateFailed);
    }

    #[tokio::test]
    async fn test_describe_error_is_propagated() {
        let target = seeded("InService");
        target
            .describe_faults()
            .push(CollaboratorError::transient("serving", "throttled"), 1);
        let err = run(target, Value::Null).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransientInfrastructureError);
    }
}
