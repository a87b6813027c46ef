//! # System Constants
//!
//! Step names, context locations and serving-target status sets shared by the
//! promotion pipeline, its executors and the reconciler.

/// Context keys written by the engine and the promotion pipeline's Task steps
pub mod context_keys {
    pub const INPUT: &str = "input";
    pub const EXECUTION: &str = "execution";
    pub const MODEL_REGISTRATION: &str = "model_registration";
    pub const SCORING: &str = "scoring";
    pub const APPROVAL: &str = "approval";
    pub const DEPLOYMENT: &str = "deployment";
    pub const ENDPOINT_CREATION: &str = "endpoint_creation";
    pub const CANARY_DEPLOYMENT: &str = "canary_deployment";
    pub const CUTOVER_DEPLOYMENT: &str = "cutover_deployment";
    pub const ENDPOINT_STATUS: &str = "endpoint_status";
    pub const CANARY_EVALUATION: &str = "canary_evaluation";
}

/// JSON pointers into the execution context
pub mod pointers {
    pub const ENDPOINT_NAME: &str = "/input/endpoint_name";
    pub const TRAINING_JOB: &str = "/input/training_job";
    pub const MODEL: &str = "/input/model";
    pub const TEST_DATASET_URI: &str = "/input/test_dataset_uri";
    pub const REGISTERED_MODEL_NAME: &str = "/model_registration/model_name";
    pub const DEPLOYMENT_STATUS: &str = "/deployment/status";
    pub const TARGET_CONFIG_NAME: &str = "/deployment/target_config/name";
    pub const CANARY_CONFIG_NAME: &str = "/deployment/canary_config/name";
}

/// Executor names bound by Task steps
pub mod executors {
    pub const REGISTER_MODEL: &str = "register_model";
    pub const RUN_SCORING: &str = "run_scoring";
    pub const REQUEST_APPROVAL: &str = "request_approval";
    pub const PREPARE_DEPLOYMENT: &str = "prepare_deployment";
    pub const CREATE_ENDPOINT: &str = "create_endpoint";
    pub const UPDATE_ENDPOINT: &str = "update_endpoint";
    pub const AWAIT_ENDPOINT: &str = "await_endpoint";
    pub const EVALUATE_CANARY: &str = "evaluate_canary";
}

/// Serving target statuses that mean a deployment is still in flight
pub const DEFAULT_BUSY_STATES: &[&str] = &[
    "Creating",
    "Updating",
    "SystemUpdating",
    "RollingBack",
    "Deleting",
];

/// Serving target statuses that end a poll with a hard failure
pub const DEFAULT_FAIL_STATES: &[&str] = &["Failed"];

/// Variant names alternate between releases
pub const PRIMARY_VARIANT_NAME: &str = "blue";
pub const SECONDARY_VARIANT_NAME: &str = "green";

/// Tag applied to every endpoint configuration the reconciler creates
pub const CONFIG_TYPE_TAG: &str = "PipelineConfigType";

/// Approval decisions as they appear on the webhook
pub mod actions {
    pub const APPROVED: &str = "Approved";
    pub const REJECTED: &str = "Rejected";
}

/// Cause strings recorded on approval failures
pub mod causes {
    pub const APPROVAL_REJECTED: &str = "approval rejected by reviewer";
    pub const APPROVAL_TIMED_OUT: &str = "approval timed out";
    pub const NO_CHOICE_MATCHED: &str = "no choice rule matched the execution context";
}
