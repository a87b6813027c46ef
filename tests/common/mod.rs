//! Shared harness for integration tests: a fully wired promoter over in-memory stores,
//! a manual clock and inspectable collaborators.

#![allow(dead_code)]

use chrono::Duration as ChronoDuration;
use promoter_core::callback::InMemoryTokenStore;
use promoter_core::collaborators::{
    EndpointConfiguration, InMemoryModelRegistry, InMemoryScoringService, InMemoryServingTarget,
    ProductionVariant, RecordingNotifier, STATUS_IN_SERVICE,
};
use promoter_core::config::PromoterConfig;
use promoter_core::database::InMemoryExecutionStore;
use promoter_core::executors::Collaborators;
use promoter_core::models::{Decision, Execution};
use promoter_core::orchestration::{PassThroughPolicy, PromoterSystem, Stores};
use promoter_core::utils::ManualClock;
use promoter_core::Resolution;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

pub const ENDPOINT: &str = "churn-endpoint";
pub const LIVE_MODEL: &str = "churn-model-live";

/// Engine timing tuned for tests; tokio time is paused so waits cost nothing
pub fn test_config() -> PromoterConfig {
    let mut config = PromoterConfig::default();
    config.engine.poll_interval_seconds = 5;
    config.engine.poll_max_attempts = 10;
    config.engine.transient_retry_max_attempts = 3;
    config.engine.transient_retry_interval_seconds = 1;
    config.engine.canary_monitoring_seconds = 60;
    config.approval.public_base_url = "https://promoter.test".to_string();
    config
}

/// A submission document carrying everything the promotion pipeline reads
pub fn submission(endpoint_name: &str) -> Value {
    json!({
        "endpoint_name": endpoint_name,
        "test_dataset_uri": "s3://sandbox/datasets/holdout.csv",
        "training_job": {
            "training_job_name": "churn-train-42",
            "experiment_name": "churn",
            "trial_name": "trial-42",
            "model_artifacts_uri": "s3://sandbox/churn-train-42/output/model.tar.gz"
        },
        "model": {
            "primary_container": {
                "image": "registry.example.com/inference:1.4",
                "model_data_url": "s3://sandbox/churn-train-42/model/model.tar.gz",
                "environment": {"SAGEMAKER_PROGRAM": "inference.py"}
            }
        }
    })
}

pub fn single_variant_config(name: &str, variant: &str, model: &str) -> EndpointConfiguration {
    EndpointConfiguration {
        name: name.to_string(),
        variants: vec![ProductionVariant {
            variant_name: variant.to_string(),
            model_name: model.to_string(),
            instance_type: "ml.g4dn.xlarge".to_string(),
            initial_instance_count: 2,
            initial_variant_weight: 1.0,
        }],
        data_capture: None,
        tags: BTreeMap::new(),
    }
}

pub struct TestPromoter {
    pub system: PromoterSystem,
    pub stores: Stores,
    pub collaborators: Collaborators,
    pub clock: ManualClock,
    pub serving: Arc<InMemoryServingTarget>,
    pub registry: Arc<InMemoryModelRegistry>,
    pub scoring: Arc<InMemoryScoringService>,
    pub notifier: Arc<RecordingNotifier>,
    pub token_store: Arc<InMemoryTokenStore>,
}

impl TestPromoter {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: PromoterConfig) -> Self {
        let clock = ManualClock::default();
        let serving = Arc::new(InMemoryServingTarget::new(1));
        let registry = Arc::new(InMemoryModelRegistry::new());
        let scoring = Arc::new(InMemoryScoringService::new(Arc::new(clock.clone())));
        let notifier = Arc::new(RecordingNotifier::new("recording"));
        let token_store = Arc::new(InMemoryTokenStore::new());

        let stores = Stores {
            executions: Arc::new(InMemoryExecutionStore::new()),
            tokens: token_store.clone(),
        };
        let collaborators = Collaborators {
            model_registry: registry.clone(),
            scoring: scoring.clone(),
            serving_target: serving.clone(),
            notifier: notifier.clone(),
            canary_policy: Arc::new(PassThroughPolicy),
        };

        let system = PromoterSystem::build(
            config,
            stores.clone(),
            collaborators.clone(),
            Arc::new(clock.clone()),
        )
        .expect("promoter system should assemble");

        Self {
            system,
            stores,
            collaborators,
            clock,
            serving,
            registry,
            scoring,
            notifier,
            token_store,
        }
    }

    /// Put a settled single-variant endpoint in front of the pipeline
    pub fn seed_live_endpoint(&self, status: &str) {
        self.serving.seed_endpoint(
            ENDPOINT,
            single_variant_config("churn-endpoint-config-0", "blue", LIVE_MODEL),
            status,
        );
    }

    pub fn seed_in_service_endpoint(&self) {
        self.seed_live_endpoint(STATUS_IN_SERVICE);
    }

    /// Replace the running system with a fresh one over the same stores and
    /// collaborators, as a process restart would
    pub fn restart(&mut self) {
        self.system.shutdown();
        self.system = PromoterSystem::build(
            self.system.config.clone(),
            self.stores.clone(),
            self.collaborators.clone(),
            Arc::new(self.clock.clone()),
        )
        .expect("restarted promoter system should assemble");
    }

    /// Start an execution inline; returns once it suspends or ends
    pub async fn start(&self) -> Uuid {
        self.start_on(ENDPOINT).await
    }

    pub async fn start_on(&self, endpoint_name: &str) -> Uuid {
        self.system
            .engine
            .start(&self.system.pipeline, submission(endpoint_name))
            .await
            .expect("execution should start")
    }

    /// Sleep in one-second steps until `execution_id` satisfies `done`
    pub async fn wait_until(
        &self,
        execution_id: Uuid,
        max_seconds: u64,
        done: impl Fn(&Execution) -> bool,
    ) -> Execution {
        let mut execution = self.execution(execution_id).await;
        for _ in 0..max_seconds {
            if done(&execution) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            execution = self.execution(execution_id).await;
        }
        execution
    }

    pub async fn execution(&self, execution_id: Uuid) -> Execution {
        self.system
            .engine
            .get_status(execution_id)
            .await
            .expect("execution should exist")
    }

    /// Token carried by the latest approval notification
    pub fn last_token(&self) -> String {
        self.notifier
            .last()
            .expect("an approval notification should have been delivered")
            .token
    }

    pub async fn respond(&self, token: &str, decision: Decision) -> Resolution {
        self.system
            .tokens
            .resolve(token, decision)
            .await
            .expect("token store should be reachable")
    }

    /// Deliver queued resumes to the engine inline
    pub async fn drain(&self) -> usize {
        self.system
            .dispatcher
            .drain()
            .await
            .expect("outbox drain should succeed")
    }

    pub fn advance_days(&self, days: i64) {
        self.clock.advance(ChronoDuration::days(days));
    }
}
