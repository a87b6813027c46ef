//! # Promotion Pipeline
//!
//! The fixed graph that moves a candidate model into production:
//!
//! ```text
//! RegisterModel → TestModel → RequestApproval ⏸ → PrepareDeployment → CheckDeploymentStatus
//!   New   → CreateEndpoint → AwaitCreation ─────────────────────────────────────────┐
//!   Ready → DeployCanary → AwaitCanary → MonitorCanary → EvaluateCanary             │
//!             → ShiftTraffic → AwaitCutover ──────────────────────────────────────▶ Succeeded
//!   Busy  → RolloutInProgress ✗
//! ```

use crate::config::EngineConfig;
use crate::constants::{context_keys, executors, pointers};
use crate::error::ErrorCode;
use crate::models::{
    ChoiceRule, ChoiceStep, Condition, FailStep, PipelineDefinition, StepDefinition, TaskStep,
    WaitStep,
};
use crate::reconciler::EndpointState;
use crate::resilience::RetryPolicy;
use serde_json::{json, Value};

pub const PIPELINE_NAME: &str = "model-promotion";
pub const PIPELINE_VERSION: &str = "1";

/// Step names of the promotion pipeline
pub mod steps {
    pub const REGISTER_MODEL: &str = "RegisterModel";
    pub const TEST_MODEL: &str = "TestModel";
    pub const REQUEST_APPROVAL: &str = "RequestApproval";
    pub const PREPARE_DEPLOYMENT: &str = "PrepareDeployment";
    pub const CHECK_DEPLOYMENT_STATUS: &str = "CheckDeploymentStatus";
    pub const ROLLOUT_IN_PROGRESS: &str = "RolloutInProgress";
    pub const CREATE_ENDPOINT: &str = "CreateEndpoint";
    pub const AWAIT_CREATION: &str = "AwaitCreation";
    pub const DEPLOY_CANARY: &str = "DeployCanary";
    pub const AWAIT_CANARY: &str = "AwaitCanary";
    pub const MONITOR_CANARY: &str = "MonitorCanary";
    pub const EVALUATE_CANARY: &str = "EvaluateCanary";
    pub const SHIFT_TRAFFIC: &str = "ShiftTraffic";
    pub const AWAIT_CUTOVER: &str = "AwaitCutover";
    pub const SUCCEEDED: &str = "Succeeded";
}

fn task(
    executor: &str,
    result_path: &str,
    parameters: Value,
    retry: Option<RetryPolicy>,
    next: &str,
) -> StepDefinition {
    StepDefinition::Task(TaskStep {
        executor: executor.to_string(),
        parameters,
        result_path: result_path.to_string(),
        retry,
        next: Some(next.to_string()),
    })
}

fn status_is(state: EndpointState, next: &str) -> ChoiceRule {
    ChoiceRule {
        condition: Condition::StringEquals {
            path: pointers::DEPLOYMENT_STATUS.to_string(),
            value: state.as_str().to_string(),
        },
        next: next.to_string(),
    }
}

/// Build the promotion pipeline with retry and timing bounds from `config`
pub fn build(config: &EngineConfig) -> PipelineDefinition {
    let transient = || {
        Some(RetryPolicy::transient(
            config.transient_retry_max_attempts,
            config.transient_retry_interval(),
        ))
    };

    PipelineDefinition::new(PIPELINE_NAME, PIPELINE_VERSION, steps::REGISTER_MODEL)
        .with_step(
            steps::REGISTER_MODEL,
            task(
                executors::REGISTER_MODEL,
                context_keys::MODEL_REGISTRATION,
                Value::Null,
                transient(),
                steps::TEST_MODEL,
            ),
        )
        .with_step(
            steps::TEST_MODEL,
            task(
                executors::RUN_SCORING,
                context_keys::SCORING,
                Value::Null,
                transient(),
                steps::REQUEST_APPROVAL,
            ),
        )
        .with_step(
            steps::REQUEST_APPROVAL,
            task(
                executors::REQUEST_APPROVAL,
                context_keys::APPROVAL,
                Value::Null,
                transient(),
                steps::PREPARE_DEPLOYMENT,
            ),
        )
        .with_step(
            steps::PREPARE_DEPLOYMENT,
            task(
                executors::PREPARE_DEPLOYMENT,
                context_keys::DEPLOYMENT,
                Value::Null,
                transient(),
                steps::CHECK_DEPLOYMENT_STATUS,
            ),
        )
        .with_step(
            steps::CHECK_DEPLOYMENT_STATUS,
            StepDefinition::Choice(ChoiceStep {
                rules: vec![
                    status_is(EndpointState::New, steps::CREATE_ENDPOINT),
                    status_is(EndpointState::Ready, steps::DEPLOY_CANARY),
                    status_is(EndpointState::Busy, steps::ROLLOUT_IN_PROGRESS),
                ],
                default: None,
            }),
        )
        .with_step(
            steps::ROLLOUT_IN_PROGRESS,
            StepDefinition::Fail(FailStep {
                error: ErrorCode::ConcurrentRolloutInProgress,
                cause: "another deployment is already in progress on the endpoint".to_string(),
            }),
        )
        .with_step(
            steps::CREATE_ENDPOINT,
            task(
                executors::CREATE_ENDPOINT,
                context_keys::ENDPOINT_CREATION,
                json!({ "config_pointer": pointers::TARGET_CONFIG_NAME }),
                transient(),
                steps::AWAIT_CREATION,
            ),
        )
        .with_step(
            steps::AWAIT_CREATION,
            task(
                executors::AWAIT_ENDPOINT,
                context_keys::ENDPOINT_STATUS,
                Value::Null,
                transient(),
                steps::SUCCEEDED,
            ),
        )
        .with_step(
            steps::DEPLOY_CANARY,
            task(
                executors::UPDATE_ENDPOINT,
                context_keys::CANARY_DEPLOYMENT,
                json!({ "config_pointer": pointers::CANARY_CONFIG_NAME }),
                transient(),
                steps::AWAIT_CANARY,
            ),
        )
        .with_step(
            steps::AWAIT_CANARY,
            task(
                executors::AWAIT_ENDPOINT,
                context_keys::ENDPOINT_STATUS,
                Value::Null,
                transient(),
                steps::MONITOR_CANARY,
            ),
        )
        .with_step(
            steps::MONITOR_CANARY,
            StepDefinition::Wait(WaitStep {
                seconds: config.canary_monitoring_seconds,
                next: steps::EVALUATE_CANARY.to_string(),
            }),
        )
        .with_step(
            steps::EVALUATE_CANARY,
            task(
                executors::EVALUATE_CANARY,
                context_keys::CANARY_EVALUATION,
                Value::Null,
                transient(),
                steps::SHIFT_TRAFFIC,
            ),
        )
        .with_step(
            steps::SHIFT_TRAFFIC,
            task(
                executors::UPDATE_ENDPOINT,
                context_keys::CUTOVER_DEPLOYMENT,
                json!({ "config_pointer": pointers::TARGET_CONFIG_NAME }),
                transient(),
                steps::AWAIT_CUTOVER,
            ),
        )
        .with_step(
            steps::AWAIT_CUTOVER,
            task(
                executors::AWAIT_ENDPOINT,
                context_keys::ENDPOINT_STATUS,
                Value::Null,
                transient(),
                steps::SUCCEEDED,
            ),
        )
        .with_step(steps::SUCCEEDED, StepDefinition::Succeed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_is_valid() {
        let pipeline = build(&EngineConfig::default());
        pipeline.validate().unwrap();
        assert_eq!(pipeline.key(), "model-promotion@1");
        assert_eq!(pipeline.steps.len(), 15);
    }

    #[test]
    fn test_status_choice_has_no_default() {
        let pipeline = build(&EngineConfig::default());
        let Some(StepDefinition::Choice(choice)) = pipeline.step(steps::CHECK_DEPLOYMENT_STATUS)
        else {
            panic!("expected choice step");
        };
        assert!(choice.default.is_none());
        assert_eq!(choice.rules.len(), 3);
    }

    #[test]
    fn test_timing_follows_config() {
        let config = EngineConfig {
            canary_monitoring_seconds: 42,
            transient_retry_max_attempts: 7,
            ..EngineConfig::default()
        };
        let pipeline = build(&config);

        let Some(StepDefinition::Wait(wait)) = pipeline.step(steps::MONITOR_CANARY) else {
            panic!("expected wait step");
        };
        assert_eq!(wait.seconds, 42);

        let Some(StepDefinition::Task(register)) = pipeline.step(steps::REGISTER_MODEL) else {
            panic!("expected task step");
        };
        assert_eq!(register.retry.as_ref().map(|r| r.max_attempts), Some(7));
    }

    #[test]
    fn test_canary_and_cutover_use_distinct_configs() {
        let pipeline = build(&EngineConfig::default());
        let pointer = |name: &str| match pipeline.step(name) {
            Some(StepDefinition::Task(task)) => task.parameters["config_pointer"].clone(),
            _ => Value::Null,
        };
        assert_eq!(pointer(steps::DEPLOY_CANARY), pointers::CANARY_CONFIG_NAME);
        assert_eq!(pointer(steps::SHIFT_TRAFFIC), pointers::TARGET_CONFIG_NAME);
    }
}
