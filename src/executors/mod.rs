//! # Task Executors
//!
//! Units of pipeline work bound to Task steps by name. The engine owns sequencing,
//! retry and suspension; an executor only reads the execution context, calls its
//! collaborator and reports an outcome.
//!
//! | Executor | Collaborator |
//! |---|---|
//! | `register_model` | [`ModelRegistry`](crate::collaborators::ModelRegistry) |
//! | `run_scoring` | [`ScoringService`](crate::collaborators::ScoringService) |
//! | `request_approval` | [`CallbackTokenManager`](crate::callback::CallbackTokenManager) + [`Notifier`](crate::collaborators::Notifier) |
//! | `prepare_deployment` | [`EndpointStateReconciler`](crate::reconciler::EndpointStateReconciler) |
//! | `create_endpoint` / `update_endpoint` / `await_endpoint` | [`ServingTarget`](crate::collaborators::ServingTarget) |
//! | `evaluate_canary` | [`CanaryHealthPolicy`](crate::orchestration::CanaryHealthPolicy) |

pub mod await_endpoint;
pub mod deploy_endpoint;
pub mod evaluate_canary;
pub mod prepare_deployment;
pub mod register_model;
pub mod registry;
pub mod request_approval;
pub mod run_scoring;
pub mod task_executor;

pub use await_endpoint::{AwaitEndpointExecutor, StatusSets};
pub use deploy_endpoint::{DeployEndpointExecutor, EndpointMutation};
pub use evaluate_canary::EvaluateCanaryExecutor;
pub use prepare_deployment::PrepareDeploymentExecutor;
pub use register_model::RegisterModelExecutor;
pub use registry::ExecutorRegistry;
pub use request_approval::RequestApprovalExecutor;
pub use run_scoring::RunScoringExecutor;
pub use task_executor::{StepError, TaskExecutor, TaskInput, TaskOutcome};

use crate::callback::CallbackTokenManager;
use crate::collaborators::{ModelRegistry, Notifier, ScoringService, ServingTarget};
use crate::config::PromoterConfig;
use crate::orchestration::CanaryHealthPolicy;
use crate::reconciler::EndpointStateReconciler;
use crate::resilience::PollPolicy;
use crate::utils::Clock;
use std::sync::Arc;

/// Collaborators the built-in executors are wired to
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub model_registry: Arc<dyn ModelRegistry>,
    pub scoring: Arc<dyn ScoringService>,
    pub serving_target: Arc<dyn ServingTarget>,
    pub notifier: Arc<dyn Notifier>,
    pub canary_policy: Arc<dyn CanaryHealthPolicy>,
}

/// Registry holding every executor the promotion pipeline names
pub fn builtin_registry(
    config: &PromoterConfig,
    collaborators: &Collaborators,
    tokens: Arc<CallbackTokenManager>,
    clock: Arc<dyn Clock>,
) -> ExecutorRegistry {
    let registry = ExecutorRegistry::new();
    let target = Arc::clone(&collaborators.serving_target);
    let reconciler = EndpointStateReconciler::new(Arc::clone(&target), (&config.deployment).into());

    registry.register(Arc::new(RegisterModelExecutor::new(
        Arc::clone(&collaborators.model_registry),
        config.deployment.artifact_bucket.clone(),
        clock,
    )));
    registry.register(Arc::new(RunScoringExecutor::new(Arc::clone(
        &collaborators.scoring,
    ))));
    registry.register(Arc::new(RequestApprovalExecutor::new(
        tokens,
        Arc::clone(&collaborators.notifier),
        config.approval.clone(),
    )));
    registry.register(Arc::new(PrepareDeploymentExecutor::new(Arc::new(reconciler))));
    registry.register(Arc::new(DeployEndpointExecutor::create(Arc::clone(&target))));
    registry.register(Arc::new(DeployEndpointExecutor::update(Arc::clone(&target))));
    registry.register(Arc::new(AwaitEndpointExecutor::new(
        Arc::clone(&target),
        PollPolicy::new(config.engine.poll_max_attempts, config.engine.poll_interval()),
    )));
    registry.register(Arc::new(EvaluateCanaryExecutor::new(
        target,
        Arc::clone(&collaborators.canary_policy),
    )));
    registry
}
