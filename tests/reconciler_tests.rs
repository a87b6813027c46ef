//! Endpoint state reconciliation against the simulated serving target, including two
//! executions racing for the same endpoint.

mod common;

use common::{single_variant_config, ENDPOINT, LIVE_MODEL};
use promoter_core::collaborators::{
    InMemoryServingTarget, ServingTarget, STATUS_IN_SERVICE, STATUS_UPDATING,
};
use promoter_core::config::DeploymentConfig;
use promoter_core::reconciler::{EndpointState, EndpointStateReconciler};
use std::sync::Arc;
use uuid::Uuid;

fn reconciler(target: Arc<InMemoryServingTarget>) -> EndpointStateReconciler {
    EndpointStateReconciler::new(target, (&DeploymentConfig::default()).into())
}

#[tokio::test]
async fn test_reconcile_is_observation_not_lock() {
    let target = Arc::new(InMemoryServingTarget::new(1));
    target.seed_endpoint(
        ENDPOINT,
        single_variant_config("live-config", "blue", LIVE_MODEL),
        STATUS_IN_SERVICE,
    );
    let reconciler = reconciler(target.clone());

    // Both executions reconcile before either deploys: both see Ready
    let first = reconciler.reconcile(Uuid::new_v4(), ENDPOINT, "candidate-a").await.unwrap();
    let second = reconciler.reconcile(Uuid::new_v4(), ENDPOINT, "candidate-b").await.unwrap();
    assert_eq!(first.status, EndpointState::Ready);
    assert_eq!(second.status, EndpointState::Ready);
    assert_ne!(
        first.canary_config.as_ref().unwrap().name,
        second.canary_config.as_ref().unwrap().name
    );

    // The first update lands; the platform refuses the second while it is in flight
    target
        .update_endpoint(ENDPOINT, &first.canary_config.unwrap().name)
        .await
        .unwrap();
    assert!(target
        .update_endpoint(ENDPOINT, &second.canary_config.unwrap().name)
        .await
        .is_err());

    // A third execution arriving now observes the rollout
    let third = reconciler.reconcile(Uuid::new_v4(), ENDPOINT, "candidate-c").await.unwrap();
    assert_eq!(third.status, EndpointState::Busy);
    assert!(third.target_config.is_none());
}

#[tokio::test]
async fn test_two_variant_endpoint_is_busy_even_when_in_service() {
    let target = Arc::new(InMemoryServingTarget::new(0));
    let mut config = single_variant_config("split-config", "blue", LIVE_MODEL);
    let mut green = config.variants[0].clone();
    green.variant_name = "green".to_string();
    green.model_name = "candidate".to_string();
    config.variants[0].initial_variant_weight = 0.5;
    green.initial_variant_weight = 0.5;
    config.variants.push(green);
    target.seed_endpoint(ENDPOINT, config, STATUS_IN_SERVICE);

    let configurations_before = target.configuration_count();
    let plan = reconciler(target.clone())
        .reconcile(Uuid::new_v4(), ENDPOINT, "next")
        .await
        .unwrap();
    assert_eq!(plan.status, EndpointState::Busy);
    assert_eq!(target.configuration_count(), configurations_before);
}

#[tokio::test]
async fn test_release_alternates_variant_names() {
    let target = Arc::new(InMemoryServingTarget::new(0));
    target.seed_endpoint(
        ENDPOINT,
        single_variant_config("green-config", "green", LIVE_MODEL),
        STATUS_IN_SERVICE,
    );

    let plan = reconciler(target.clone())
        .reconcile(Uuid::new_v4(), ENDPOINT, "next")
        .await
        .unwrap();
    let target_config = plan.target_config.unwrap().configuration;
    assert_eq!(target_config.variants.len(), 1);
    assert_eq!(target_config.variants[0].variant_name, "blue");
    assert_eq!(target_config.variants[0].model_name, "next");
    assert_eq!(target_config.tags["PipelineConfigType"], "Target");
    assert_eq!(plan.live_variant.unwrap().variant_name, "green");
}

#[tokio::test]
async fn test_transitional_status_is_busy() {
    let target = Arc::new(InMemoryServingTarget::new(0));
    target.seed_endpoint(
        ENDPOINT,
        single_variant_config("live-config", "blue", LIVE_MODEL),
        STATUS_UPDATING,
    );
    let plan = reconciler(target).reconcile(Uuid::new_v4(), ENDPOINT, "next").await.unwrap();
    assert_eq!(plan.status, EndpointState::Busy);
}
