//! # Serving Target
//!
//! Interface to the live model-serving endpoints, plus an in-memory simulation that
//! walks endpoints through transitional statuses the way a managed platform does.
//!
//! Endpoint status is an open set of strings (`InService`, `Creating`, `Updating`,
//! `SystemUpdating`, `RollingBack`, `Deleting`, `Failed`, ...) so polling steps can be
//! configured with custom busy/fail/target sets.

use super::error::{CollaboratorError, CollaboratorResult, InjectedFaults};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

pub const STATUS_IN_SERVICE: &str = "InService";
pub const STATUS_CREATING: &str = "Creating";
pub const STATUS_UPDATING: &str = "Updating";

/// One variant of an endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionVariant {
    pub variant_name: String,
    pub model_name: String,
    pub instance_type: String,
    pub initial_instance_count: u32,
    pub initial_variant_weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCaptureConfig {
    pub enable_capture: bool,
    pub initial_sampling_percentage: u32,
    pub destination_uri: String,
    pub capture_modes: Vec<CaptureMode>,
}

/// Immutable, named set of variants an endpoint can be pointed at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfiguration {
    pub name: String,
    pub variants: Vec<ProductionVariant>,
    #[serde(default)]
    pub data_capture: Option<DataCaptureConfig>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Live state of one variant as reported by `describe`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub variant_name: String,
    pub model_name: String,
    pub current_weight: f64,
    pub current_instance_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub endpoint_name: String,
    pub status: String,
    pub config_name: String,
    pub variants: Vec<VariantSummary>,
}

#[async_trait]
pub trait ServingTarget: Send + Sync + std::fmt::Debug {
    /// Describe an endpoint; `None` when it does not exist
    async fn describe(
        &self,
        endpoint_name: &str,
    ) -> CollaboratorResult<Option<EndpointDescription>>;

    async fn describe_configuration(
        &self,
        config_name: &str,
    ) -> CollaboratorResult<Option<EndpointConfiguration>>;

    /// Create a named configuration; returns its identifier
    async fn create_configuration(
        &self,
        config: &EndpointConfiguration,
    ) -> CollaboratorResult<String>;

    async fn create_endpoint(
        &self,
        endpoint_name: &str,
        config_name: &str,
    ) -> CollaboratorResult<String>;

    /// Point an existing endpoint at another configuration
    async fn update_endpoint(
        &self,
        endpoint_name: &str,
        config_name: &str,
    ) -> CollaboratorResult<String>;
}

#[derive(Debug, Clone)]
struct EndpointRecord {
    status: String,
    config_name: String,
    variants: Vec<VariantSummary>,
    /// Statuses the next `describe` calls will report, one per call
    script: VecDeque<String>,
}

impl EndpointRecord {
    fn snapshot(&self, endpoint_name: &str) -> EndpointDescription {
        EndpointDescription {
            endpoint_name: endpoint_name.to_string(),
            status: self.status.clone(),
            config_name: self.config_name.clone(),
            variants: self.variants.clone(),
        }
    }
}

fn summaries(config: &EndpointConfiguration) -> Vec<VariantSummary> {
    config
        .variants
        .iter()
        .map(|v| VariantSummary {
            variant_name: v.variant_name.clone(),
            model_name: v.model_name.clone(),
            current_weight: v.initial_variant_weight,
            current_instance_count: v.initial_instance_count,
        })
        .collect()
}

#[derive(Debug, Default)]
struct ServingState {
    endpoints: HashMap<String, EndpointRecord>,
    configurations: HashMap<String, EndpointConfiguration>,
}

/// Simulated serving platform.
///
/// Creating or updating an endpoint reports the transitional status for
/// `transition_polls` describes before settling on `InService`.
#[derive(Debug)]
pub struct InMemoryServingTarget {
    state: Mutex<ServingState>,
    transition_polls: usize,
    describe_faults: InjectedFaults,
    mutation_faults: InjectedFaults,
}

impl Default for InMemoryServingTarget {
    fn default() -> Self {
        Self::new(1)
    }
}

impl InMemoryServingTarget {
    pub fn new(transition_polls: usize) -> Self {
        Self {
            state: Mutex::new(ServingState::default()),
            transition_polls,
            describe_faults: InjectedFaults::default(),
            mutation_faults: InjectedFaults::default(),
        }
    }

    /// Failures returned by `describe` before it behaves normally
    pub fn describe_faults(&self) -> &InjectedFaults {
        &self.describe_faults
    }

    /// Failures returned by create/update calls before they behave normally
    pub fn mutation_faults(&self) -> &InjectedFaults {
        &self.mutation_faults
    }

    /// Install a settled endpoint serving `config`
    pub fn seed_endpoint(&self, endpoint_name: &str, config: EndpointConfiguration, status: &str) {
        let mut state = self.state.lock();
        let record = EndpointRecord {
            status: status.to_string(),
            config_name: config.name.clone(),
            variants: summaries(&config),
            script: VecDeque::new(),
        };
        state.configurations.insert(config.name.clone(), config);
        state.endpoints.insert(endpoint_name.to_string(), record);
    }

    /// Replace the statuses the next describes will report
    pub fn script_statuses(&self, endpoint_name: &str, statuses: &[&str]) {
        if let Some(record) = self.state.lock().endpoints.get_mut(endpoint_name) {
            record.script = statuses.iter().map(|s| s.to_string()).collect();
        }
    }

    pub fn set_status(&self, endpoint_name: &str, status: &str) {
        if let Some(record) = self.state.lock().endpoints.get_mut(endpoint_name) {
            record.status = status.to_string();
            record.script.clear();
        }
    }

    /// Current state without consuming scripted statuses
    pub fn peek(&self, endpoint_name: &str) -> Option<EndpointDescription> {
        self.state
            .lock()
            .endpoints
            .get(endpoint_name)
            .map(|r| r.snapshot(endpoint_name))
    }

    pub fn configuration(&self, config_name: &str) -> Option<EndpointConfiguration> {
        self.state.lock().configurations.get(config_name).cloned()
    }

    pub fn configuration_count(&self) -> usize {
        self.state.lock().configurations.len()
    }

    fn transition_script(&self, transitional: &str) -> VecDeque<String> {
        std::iter::repeat(transitional.to_string())
            .take(self.transition_polls)
            .chain(std::iter::once(STATUS_IN_SERVICE.to_string()))
            .collect()
    }
}

#[async_trait]
impl ServingTarget for InMemoryServingTarget {
    async fn describe(
        &self,
        endpoint_name: &str,
    ) -> CollaboratorResult<Option<EndpointDescription>> {
        self.describe_faults.next()?;

        let mut state = self.state.lock();
        Ok(state.endpoints.get_mut(endpoint_name).map(|record| {
            if let Some(next) = record.script.pop_front() {
                record.status = next;
            }
            record.snapshot(endpoint_name)
        }))
    }

    async fn describe_configuration(
        &self,
        config_name: &str,
    ) -> CollaboratorResult<Option<EndpointConfiguration>> {
        Ok(self.configuration(config_name))
    }

    async fn create_configuration(
        &self,
        config: &EndpointConfiguration,
    ) -> CollaboratorResult<String> {
        self.mutation_faults.next()?;

        let mut state = self.state.lock();
        if state.configurations.contains_key(&config.name) {
            return Err(CollaboratorError::rejected(
                "serving_target",
                format!("endpoint configuration {} already exists", config.name),
            ));
        }
        state.configurations.insert(config.name.clone(), config.clone());
        Ok(format!("arn:promoter:endpoint-config/{}", config.name))
    }

    async fn create_endpoint(
        &self,
        endpoint_name: &str,
        config_name: &str,
    ) -> CollaboratorResult<String> {
        self.mutation_faults.next()?;

        let mut state = self.state.lock();
        if state.endpoints.contains_key(endpoint_name) {
            return Err(CollaboratorError::rejected(
                "serving_target",
                format!("endpoint {endpoint_name} already exists"),
            ));
        }
        let config = state.configurations.get(config_name).cloned().ok_or_else(|| {
            CollaboratorError::rejected(
                "serving_target",
                format!("endpoint configuration {config_name} does not exist"),
            )
        })?;

        let record = EndpointRecord {
            status: STATUS_CREATING.to_string(),
            config_name: config.name.clone(),
            variants: summaries(&config),
            script: self.transition_script(STATUS_CREATING),
        };
        state.endpoints.insert(endpoint_name.to_string(), record);
        Ok(format!("arn:promoter:endpoint/{endpoint_name}"))
    }

    async fn update_endpoint(
        &self,
        endpoint_name: &str,
        config_name: &str,
    ) -> CollaboratorResult<String> {
        self.mutation_faults.next()?;

        let mut state = self.state.lock();
        let config = state.configurations.get(config_name).cloned().ok_or_else(|| {
            CollaboratorError::rejected(
                "serving_target",
                format!("endpoint configuration {config_name} does not exist"),
            )
        })?;
        let script = self.transition_script(STATUS_UPDATING);
        let record = state.endpoints.get_mut(endpoint_name).ok_or_else(|| {
            CollaboratorError::rejected(
                "serving_target",
                format!("endpoint {endpoint_name} does not exist"),
            )
        })?;
        if record.status != STATUS_IN_SERVICE {
            return Err(CollaboratorError::rejected(
                "serving_target",
                format!("endpoint {endpoint_name} is in status {}", record.status),
            ));
        }

        record.status = STATUS_UPDATING.to_string();
        record.config_name = config.name.clone();
        record.variants = summaries(&config);
        record.script = script;
        Ok(format!("arn:promoter:endpoint/{endpoint_name}"))
    }
}
