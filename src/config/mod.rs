//! # Promoter Configuration System
//!
//! Layered configuration for the promotion orchestrator:
//!
//! 1. `config/promoter.yaml` (base, required when a directory is given)
//! 2. `config/promoter.{environment}.yaml` (optional override)
//! 3. `PROMOTER__SECTION__KEY` environment variables
//!
//! Every section has defaults that match the production promotion pipeline, so a
//! partial YAML file only needs to list what differs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use promoter_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let ttl = manager.config().approval.token_ttl();
//! let bind = &manager.config().web.bind_address;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring promoter.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PromoterConfig {
    /// Execution and token persistence
    pub database: DatabaseConfig,

    /// Retry, polling and monitoring windows
    pub engine: EngineConfig,

    /// Human approval step
    pub approval: ApprovalConfig,

    /// Serving configuration produced by the reconciler
    pub deployment: DeploymentConfig,

    /// HTTP surface
    pub web: WebConfig,
}

impl PromoterConfig {
    /// Validate cross-field constraints that serde cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.engine.poll_max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.poll_max_attempts",
                "0",
                "polling needs at least one attempt",
            ));
        }
        if self.engine.transient_retry_max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.transient_retry_max_attempts",
                "0",
                "a Task step needs at least one attempt",
            ));
        }
        let weight = self.deployment.canary_traffic_weight;
        if !(weight > 0.0 && weight < 1.0) {
            return Err(ConfigurationError::invalid_value(
                "deployment.canary_traffic_weight",
                weight.to_string(),
                "canary weight must be strictly between 0 and 1",
            ));
        }
        if self.deployment.capture_sampling_percentage > 100 {
            return Err(ConfigurationError::invalid_value(
                "deployment.capture_sampling_percentage",
                self.deployment.capture_sampling_percentage.to_string(),
                "sampling percentage cannot exceed 100",
            ));
        }
        if self.deployment.initial_instance_count == 0 {
            return Err(ConfigurationError::invalid_value(
                "deployment.initial_instance_count",
                "0",
                "a serving variant needs at least one instance",
            ));
        }
        if self.approval.token_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "approval.token_ttl_seconds",
                "0",
                "approval tokens must live for at least one second",
            ));
        }
        if self.web.bind_address.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "bind_address",
                "web",
            ));
        }
        Ok(())
    }
}

/// Persistence configuration; no URL means in-memory stores
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            run_migrations: true,
        }
    }
}

/// Workflow engine timing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub poll_interval_seconds: u64,
    pub poll_max_attempts: u32,
    pub transient_retry_max_attempts: u32,
    pub transient_retry_interval_seconds: u64,
    pub canary_monitoring_seconds: u64,
    pub expiry_sweep_interval_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            poll_max_attempts: 24,
            transient_retry_max_attempts: 3,
            transient_retry_interval_seconds: 10,
            canary_monitoring_seconds: 300,
            expiry_sweep_interval_seconds: 60,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn transient_retry_interval(&self) -> Duration {
        Duration::from_secs(self.transient_retry_interval_seconds)
    }

    pub fn canary_monitoring_window(&self) -> Duration {
        Duration::from_secs(self.canary_monitoring_seconds)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_seconds)
    }
}

/// Human approval step
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub token_ttl_seconds: u64,
    /// Base URL that approval links and execution detail links are built on
    pub public_base_url: String,
    pub recipient: String,
    /// Secondary channel tried when delivery to `recipient` fails
    pub fallback_recipient: Option<String>,
    pub subject: String,
    pub timeout_description: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: 7 * 24 * 60 * 60,
            public_base_url: "http://localhost:8080".to_string(),
            recipient: "ml-approvers@example.com".to_string(),
            fallback_recipient: None,
            subject: "Your approval needed for model deployment".to_string(),
            timeout_description: "7 days".to_string(),
        }
    }
}

impl ApprovalConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }
}

/// Serving configuration parameters used by the reconciler
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub instance_type: String,
    pub initial_instance_count: u32,
    /// Share of traffic the new model receives during the canary stage
    pub canary_traffic_weight: f64,
    pub capture_destination_uri: Option<String>,
    pub capture_sampling_percentage: u32,
    /// Project bucket that promoted artifacts are copied into
    pub artifact_bucket: String,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            instance_type: "ml.g4dn.xlarge".to_string(),
            initial_instance_count: 1,
            canary_traffic_weight: 0.1,
            capture_destination_uri: None,
            capture_sampling_percentage: 50,
            artifact_bucket: "promoter-project-artifacts".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PromoterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.approval.token_ttl(), Duration::from_secs(604_800));
        assert_eq!(config.engine.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.engine.poll_max_attempts, 24);
    }

    #[test]
    fn test_rejects_out_of_range_canary_weight() {
        let mut config = PromoterConfig::default();
        config.deployment.canary_traffic_weight = 1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("canary_traffic_weight"));

        config.deployment.canary_traffic_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_attempts_and_ttl() {
        let mut config = PromoterConfig::default();
        config.engine.poll_max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = PromoterConfig::default();
        config.approval.token_ttl_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_bind_address() {
        let mut config = PromoterConfig::default();
        config.web.bind_address = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { .. })
        ));
    }
}
