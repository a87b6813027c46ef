use crate::collaborators::{EndpointConfiguration, VariantSummary};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a serving target, derived fresh from `describe` on every call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointState {
    /// No endpoint exists yet
    New,
    /// A rollout is in flight (several variants, or a transitional status)
    Busy,
    /// Exactly one settled variant
    Ready,
}

impl EndpointState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Busy => "Busy",
            Self::Ready => "Ready",
        }
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a configuration created by the reconciler, recorded as a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigRole {
    Target,
    Canary,
}

impl ConfigRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Target => "Target",
            Self::Canary => "Canary",
        }
    }
}

/// A configuration the reconciler created on the serving target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedConfig {
    pub name: String,
    /// Absent when an earlier attempt of the same execution already created it
    #[serde(default)]
    pub arn: Option<String>,
    pub configuration: EndpointConfiguration,
}

/// Reconciler output, written under `/deployment` in the execution context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub status: EndpointState,
    pub endpoint_name: String,
    pub model_name: String,
    /// Variant serving traffic when the plan was made (Ready only)
    pub live_variant: Option<VariantSummary>,
    /// Two-variant interim configuration (Ready only)
    pub canary_config: Option<PreparedConfig>,
    /// Full-cutover configuration (New and Ready)
    pub target_config: Option<PreparedConfig>,
}

impl DeploymentPlan {
    pub fn busy(endpoint_name: &str, model_name: &str) -> Self {
        Self {
            status: EndpointState::Busy,
            endpoint_name: endpoint_name.to_string(),
            model_name: model_name.to_string(),
            live_variant: None,
            canary_config: None,
            target_config: None,
        }
    }
}
