//! # Endpoint State Reconciler
//!
//! Inspects a serving target and prepares the configurations the next deployment steps
//! apply.
//!
//! | Observed                                   | State   | Configurations created        |
//! |--------------------------------------------|---------|-------------------------------|
//! | endpoint missing                           | `New`   | target (`blue` @ 100%)        |
//! | > 1 variant, or a transitional status      | `Busy`  | none                          |
//! | exactly one settled variant                | `Ready` | target + canary               |
//!
//! The `Busy` check is an observation of external state, not a lock. Two executions
//! that reconcile the same target before either deployment lands both see `Ready`; the
//! serving platform rejects the second update while the first is in flight.
//!
//! Configuration names are scoped to the execution. A retried reconcile finds the
//! configuration an earlier attempt created and reuses it instead of leaving it behind.

use super::plan::{ConfigRole, DeploymentPlan, EndpointState, PreparedConfig};
use crate::collaborators::{
    CaptureMode, CollaboratorError, DataCaptureConfig, EndpointConfiguration, EndpointDescription,
    ProductionVariant, ServingTarget, VariantSummary,
};
use crate::config::DeploymentConfig;
use crate::constants::{
    CONFIG_TYPE_TAG, DEFAULT_BUSY_STATES, PRIMARY_VARIANT_NAME, SECONDARY_VARIANT_NAME,
};
use crate::utils::scoped_name;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("Endpoint {endpoint_name} modified concurrently: {detail}")]
    ModifiedConcurrently {
        endpoint_name: String,
        detail: String,
    },
}

/// Deployment shape applied to every configuration the reconciler creates
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerSettings {
    pub instance_type: String,
    pub initial_instance_count: u32,
    /// Share of traffic the new model receives during the canary stage
    pub canary_traffic_weight: f64,
    pub data_capture: Option<DataCaptureConfig>,
}

impl From<&DeploymentConfig> for ReconcilerSettings {
    fn from(config: &DeploymentConfig) -> Self {
        Self {
            instance_type: config.instance_type.clone(),
            initial_instance_count: config.initial_instance_count,
            canary_traffic_weight: config.canary_traffic_weight,
            data_capture: config
                .capture_destination_uri
                .as_ref()
                .map(|destination| DataCaptureConfig {
                    enable_capture: true,
                    initial_sampling_percentage: config.capture_sampling_percentage,
                    destination_uri: destination.clone(),
                    capture_modes: vec![CaptureMode::Input, CaptureMode::Output],
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointStateReconciler {
    target: Arc<dyn ServingTarget>,
    settings: ReconcilerSettings,
}

impl EndpointStateReconciler {
    pub fn new(target: Arc<dyn ServingTarget>, settings: ReconcilerSettings) -> Self {
        Self { target, settings }
    }

    /// Pure classification of a describe result
    pub fn classify(description: Option<&EndpointDescription>) -> EndpointState {
        match description {
            None => EndpointState::New,
            Some(endpoint)
                if endpoint.variants.len() > 1
                    || DEFAULT_BUSY_STATES.contains(&endpoint.status.as_str()) =>
            {
                EndpointState::Busy
            }
            Some(_) => EndpointState::Ready,
        }
    }

    /// Variant name for the next release given the live one
    pub fn next_variant_name(live_variant: &str) -> &'static str {
        if live_variant == PRIMARY_VARIANT_NAME {
            SECONDARY_VARIANT_NAME
        } else {
            PRIMARY_VARIANT_NAME
        }
    }

    /// Classify `endpoint_name` and create the configurations its state calls for.
    ///
    /// Safe to repeat for the same `execution_id`.
    pub async fn reconcile(
        &self,
        execution_id: Uuid,
        endpoint_name: &str,
        model_name: &str,
    ) -> Result<DeploymentPlan, ReconcileError> {
        let description = self.target.describe(endpoint_name).await?;
        let status = Self::classify(description.as_ref());
        debug!(endpoint = %endpoint_name, state = %status, "Classified serving target");

        let plan = match (status, description) {
            (EndpointState::Busy, _) => DeploymentPlan::busy(endpoint_name, model_name),
            (EndpointState::New, _) | (EndpointState::Ready, None) => {
                let new_variant = self.new_variant(PRIMARY_VARIANT_NAME, model_name, 1.0);
                let target_config = self
                    .create(execution_id, endpoint_name, ConfigRole::Target, vec![new_variant])
                    .await?;
                DeploymentPlan {
                    status: EndpointState::New,
                    endpoint_name: endpoint_name.to_string(),
                    model_name: model_name.to_string(),
                    live_variant: None,
                    canary_config: None,
                    target_config: Some(target_config),
                }
            }
            (EndpointState::Ready, Some(endpoint)) => {
                self.plan_canary(execution_id, endpoint_name, model_name, &endpoint)
                    .await?
            }
        };

        info!(
            endpoint = %endpoint_name,
            model = %model_name,
            state = %plan.status,
            target_config = ?plan.target_config.as_ref().map(|c| &c.name),
            canary_config = ?plan.canary_config.as_ref().map(|c| &c.name),
            "Deployment plan prepared"
        );
        Ok(plan)
    }

    async fn plan_canary(
        &self,
        execution_id: Uuid,
        endpoint_name: &str,
        model_name: &str,
        endpoint: &EndpointDescription,
    ) -> Result<DeploymentPlan, ReconcileError> {
        let live = endpoint
            .variants
            .first()
            .cloned()
            .ok_or_else(|| ReconcileError::ModifiedConcurrently {
                endpoint_name: endpoint_name.to_string(),
                detail: "endpoint reports no variants".to_string(),
            })?;
        let existing = self.live_variant_config(endpoint_name, endpoint, &live).await?;

        let new_variant_name = Self::next_variant_name(&live.variant_name);
        let canary_weight = self.settings.canary_traffic_weight;

        let target_variant = self.new_variant(new_variant_name, model_name, 1.0);
        let target_config = self
            .create(execution_id, endpoint_name, ConfigRole::Target, vec![target_variant])
            .await?;

        let interim_existing = ProductionVariant {
            initial_instance_count: live.current_instance_count,
            initial_variant_weight: 1.0 - canary_weight,
            ..existing
        };
        let interim_new = self.new_variant(new_variant_name, model_name, canary_weight);
        let canary_config = self
            .create(
                execution_id,
                endpoint_name,
                ConfigRole::Canary,
                vec![interim_existing, interim_new],
            )
            .await?;

        Ok(DeploymentPlan {
            status: EndpointState::Ready,
            endpoint_name: endpoint_name.to_string(),
            model_name: model_name.to_string(),
            live_variant: Some(live),
            canary_config: Some(canary_config),
            target_config: Some(target_config),
        })
    }

    /// Full configuration of the live variant, cross-referenced from its endpoint configuration
    async fn live_variant_config(
        &self,
        endpoint_name: &str,
        endpoint: &EndpointDescription,
        live: &VariantSummary,
    ) -> Result<ProductionVariant, ReconcileError> {
        let configuration = self
            .target
            .describe_configuration(&endpoint.config_name)
            .await?
            .ok_or_else(|| ReconcileError::ModifiedConcurrently {
                endpoint_name: endpoint_name.to_string(),
                detail: format!("configuration {} no longer exists", endpoint.config_name),
            })?;

        configuration
            .variants
            .into_iter()
            .find(|v| v.variant_name == live.variant_name)
            .ok_or_else(|| ReconcileError::ModifiedConcurrently {
                endpoint_name: endpoint_name.to_string(),
                detail: format!(
                    "variant {} is missing from configuration {}",
                    live.variant_name, endpoint.config_name
                ),
            })
    }

    fn new_variant(&self, variant_name: &str, model_name: &str, weight: f64) -> ProductionVariant {
        ProductionVariant {
            variant_name: variant_name.to_string(),
            model_name: model_name.to_string(),
            instance_type: self.settings.instance_type.clone(),
            initial_instance_count: self.settings.initial_instance_count,
            initial_variant_weight: weight,
        }
    }

    async fn create(
        &self,
        execution_id: Uuid,
        endpoint_name: &str,
        role: ConfigRole,
        variants: Vec<ProductionVariant>,
    ) -> Result<PreparedConfig, ReconcileError> {
        let suffix = match role {
            ConfigRole::Target => "target",
            ConfigRole::Canary => "canary",
        };
        let configuration = EndpointConfiguration {
            name: scoped_name(&format!("{endpoint_name}-{suffix}"), execution_id),
            variants,
            data_capture: self.settings.data_capture.clone(),
            tags: BTreeMap::from([(CONFIG_TYPE_TAG.to_string(), role.as_str().to_string())]),
        };

        let arn = match self.target.describe_configuration(&configuration.name).await? {
            Some(existing) if existing == configuration => {
                info!(
                    endpoint = %endpoint_name,
                    config = %configuration.name,
                    "Reusing configuration from an earlier attempt"
                );
                None
            }
            Some(_) => {
                return Err(ReconcileError::ModifiedConcurrently {
                    endpoint_name: endpoint_name.to_string(),
                    detail: format!(
                        "configuration {} exists with different variants",
                        configuration.name
                    ),
                })
            }
            None => Some(self.target.create_configuration(&configuration).await?),
        };
        Ok(PreparedConfig {
            name: configuration.name.clone(),
            arn,
            configuration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryServingTarget;

    fn settings() -> ReconcilerSettings {
        ReconcilerSettings::from(&DeploymentConfig::default())
    }

    fn reconciler(target: Arc<InMemoryServingTarget>) -> EndpointStateReconciler {
        EndpointStateReconciler::new(target, settings())
    }

    fn single_variant(name: &str, variant: &str, instances: u32) -> EndpointConfiguration {
        EndpointConfiguration {
            name: name.to_string(),
            variants: vec![ProductionVariant {
                variant_name: variant.to_string(),
                model_name: "old-model".to_string(),
                instance_type: "ml.m5.large".to_string(),
                initial_instance_count: instances,
                initial_variant_weight: 1.0,
            }],
            data_capture: None,
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(EndpointStateReconciler::classify(None), EndpointState::New);

        let mut endpoint = EndpointDescription {
            endpoint_name: "ep".into(),
            status: "InService".into(),
            config_name: "cfg".into(),
            variants: vec![VariantSummary {
                variant_name: "blue".into(),
                model_name: "m".into(),
                current_weight: 1.0,
                current_instance_count: 1,
            }],
        };
        assert_eq!(
            EndpointStateReconciler::classify(Some(&endpoint)),
            EndpointState::Ready
        );

        endpoint.status = "Updating".into();
        assert_eq!(
            EndpointStateReconciler::classify(Some(&endpoint)),
            EndpointState::Busy
        );

        endpoint.status = "InService".into();
        endpoint.variants.push(endpoint.variants[0].clone());
        assert_eq!(
            EndpointStateReconciler::classify(Some(&endpoint)),
            EndpointState::Busy
        );
    }

    #[test]
    fn test_variant_alternation() {
        assert_eq!(EndpointStateReconciler::next_variant_name("blue"), "green");
        assert_eq!(EndpointStateReconciler::next_variant_name("green"), "blue");
        assert_eq!(EndpointStateReconciler::next_variant_name("legacy"), "blue");
    }

    #[tokio::test]
    async fn test_new_endpoint_gets_target_only() {
        let target = Arc::new(InMemoryServingTarget::default());
        let plan = reconciler(target.clone())
            .reconcile(Uuid::new_v4(), "demo-ep", "m-new")
            .await
            .unwrap();

        assert_eq!(plan.status, EndpointState::New);
        assert!(plan.canary_config.is_none());
        let config = plan.target_config.unwrap();
        assert!(config.name.starts_with("demo-ep-target-"));
        assert_eq!(config.configuration.variants.len(), 1);
        assert_eq!(config.configuration.variants[0].variant_name, "blue");
        assert_eq!(config.configuration.variants[0].initial_variant_weight, 1.0);
        assert_eq!(
            config.configuration.tags.get(CONFIG_TYPE_TAG).map(String::as_str),
            Some("Target")
        );
        assert!(target.configuration(&config.name).is_some());
    }

    #[tokio::test]
    async fn test_ready_endpoint_gets_canary_and_target() {
        let target = Arc::new(InMemoryServingTarget::default());
        target.seed_endpoint("ep", single_variant("cfg-live", "blue", 3), "InService");

        let plan = reconciler(target.clone())
            .reconcile(Uuid::new_v4(), "ep", "m-new")
            .await
            .unwrap();
        assert_eq!(plan.status, EndpointState::Ready);

        let target_config = plan.target_config.unwrap().configuration;
        assert_eq!(target_config.variants.len(), 1);
        assert_eq!(target_config.variants[0].variant_name, "green");
        assert_eq!(target_config.variants[0].model_name, "m-new");

        let canary = plan.canary_config.unwrap().configuration;
        assert_eq!(canary.variants.len(), 2);
        let (existing, new) = (&canary.variants[0], &canary.variants[1]);
        assert_eq!(existing.variant_name, "blue");
        assert_eq!(existing.model_name, "old-model");
        assert_eq!(existing.instance_type, "ml.m5.large");
        assert_eq!(existing.initial_instance_count, 3);
        assert!((existing.initial_variant_weight - 0.9).abs() < 1e-9);
        assert_eq!(new.variant_name, "green");
        assert!((new.initial_variant_weight - 0.1).abs() < 1e-9);
        assert_eq!(
            canary.tags.get(CONFIG_TYPE_TAG).map(String::as_str),
            Some("Canary")
        );
    }

    #[tokio::test]
    async fn test_busy_endpoint_creates_nothing() {
        let target = Arc::new(InMemoryServingTarget::default());
        target.seed_endpoint("ep", single_variant("cfg-live", "blue", 1), "Updating");
        let before = target.configuration_count();

        let plan = reconciler(target.clone())
            .reconcile(Uuid::new_v4(), "ep", "m-new")
            .await
            .unwrap();
        assert_eq!(plan.status, EndpointState::Busy);
        assert!(plan.target_config.is_none());
        assert!(plan.canary_config.is_none());
        assert_eq!(target.configuration_count(), before);
    }

    #[tokio::test]
    async fn test_missing_live_variant_is_concurrent_modification() {
        let target = Arc::new(InMemoryServingTarget::default());
        target.seed_endpoint("ep", single_variant("cfg-live", "blue", 1), "InService");
        // Replace the live configuration with one that lacks the live variant
        target.seed_endpoint("decoy", single_variant("cfg-live", "green", 1), "InService");

        let err = reconciler(target)
            .reconcile(Uuid::new_v4(), "ep", "m")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::ModifiedConcurrently { .. }));
    }

    #[tokio::test]
    async fn test_data_capture_applied_when_configured() {
        let target = Arc::new(InMemoryServingTarget::default());
        let config = DeploymentConfig {
            capture_destination_uri: Some("s3://monitoring/capture".into()),
            ..DeploymentConfig::default()
        };
        let reconciler = EndpointStateReconciler::new(target, ReconcilerSettings::from(&config));
        let plan = reconciler.reconcile(Uuid::new_v4(), "ep", "m").await.unwrap();
        let capture = plan.target_config.unwrap().configuration.data_capture.unwrap();
        assert_eq!(capture.initial_sampling_percentage, 50);
        assert_eq!(capture.capture_modes, vec![CaptureMode::Input, CaptureMode::Output]);
    }

    #[tokio::test]
    async fn test_repeated_reconcile_reuses_configurations() {
        let target = Arc::new(InMemoryServingTarget::default());
        target.seed_endpoint("ep", single_variant("cfg-live", "blue", 2), "InService");
        let before = target.configuration_count();
        let reconciler = reconciler(target.clone());
        let execution_id = Uuid::new_v4();

        // The canary create fails after the target configuration already landed
        target.mutation_faults().pass(1);
        target
            .mutation_faults()
            .push(CollaboratorError::transient("serving_target", "throttled"), 1);
        let err = reconciler.reconcile(execution_id, "ep", "m-new").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Collaborator(_)));
        assert_eq!(target.configuration_count(), before + 1);

        let plan = reconciler.reconcile(execution_id, "ep", "m-new").await.unwrap();
        let target_config = plan.target_config.unwrap();
        assert!(target_config.arn.is_none());
        assert!(plan.canary_config.unwrap().arn.is_some());
        assert_eq!(target.configuration_count(), before + 2);

        // Another execution gets its own names
        let other = reconciler.reconcile(Uuid::new_v4(), "ep", "m-new").await.unwrap();
        assert_ne!(other.target_config.unwrap().name, target_config.name);
        assert_eq!(target.configuration_count(), before + 4);
    }

    #[tokio::test]
    async fn test_conflicting_configuration_under_scoped_name_is_rejected() {
        let target = Arc::new(InMemoryServingTarget::default());
        let execution_id = Uuid::new_v4();
        reconciler(target.clone())
            .reconcile(execution_id, "ep", "m-one")
            .await
            .unwrap();

        let err = reconciler(target)
            .reconcile(execution_id, "ep", "m-two")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::ModifiedConcurrently { .. }));
    }
}
