//! Canary health policies.
//!
//! A policy inspects the endpoint after the monitoring window and decides whether the
//! new variant may take all traffic. The shipped policy approves unconditionally so the
//! rollout behaves as a fixed-delay canary; metric-driven policies plug in here.

use crate::collaborators::{CollaboratorResult, EndpointDescription};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanaryVerdict {
    Healthy,
    Unhealthy(String),
}

#[async_trait]
pub trait CanaryHealthPolicy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn evaluate(
        &self,
        endpoint: &EndpointDescription,
        context: &Value,
    ) -> CollaboratorResult<CanaryVerdict>;
}

/// Approves every canary that survived the monitoring window
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughPolicy;

#[async_trait]
impl CanaryHealthPolicy for PassThroughPolicy {
    fn name(&self) -> &str {
        "pass_through"
    }

    async fn evaluate(
        &self,
        _endpoint: &EndpointDescription,
        _context: &Value,
    ) -> CollaboratorResult<CanaryVerdict> {
        Ok(CanaryVerdict::Healthy)
    }
}
