use serde::{Deserialize, Serialize};
use std::fmt;

use crate::callback::TokenError;
use crate::config::ConfigurationError;
use crate::database::StoreError;
use crate::executors::StepError;

/// Failure taxonomy reported on every failed execution.
///
/// Only `TransientInfrastructureError` is ever retried, and only when the
/// failing Task step's retry policy names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Retryable per-step policy (throttling, network, transitional endpoint state)
    TransientInfrastructureError,
    /// Human reviewer rejected the candidate
    ApprovalRejected,
    /// Approval token expired before anyone responded
    ApprovalExpired,
    /// Serving target already has a rollout in flight
    ConcurrentRolloutInProgress,
    /// No Choice predicate matched, or the definition is malformed
    ConfigurationError,
    /// Retry or polling bound exceeded while the target was still transitioning
    AttemptsExhausted,
    /// Serving target entered a failure state while being polled
    EndpointUpdateFailed,
    /// Non-retryable executor failure
    TaskFailed,
}

impl ErrorCode {
    /// Whether this code fails an execution no matter what retry policy is attached
    pub fn is_terminal_by_default(&self) -> bool {
        !matches!(self, Self::TransientInfrastructureError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientInfrastructureError => "TransientInfrastructureError",
            Self::ApprovalRejected => "ApprovalRejected",
            Self::ApprovalExpired => "ApprovalExpired",
            Self::ConcurrentRolloutInProgress => "ConcurrentRolloutInProgress",
            Self::ConfigurationError => "ConfigurationError",
            Self::AttemptsExhausted => "AttemptsExhausted",
            Self::EndpointUpdateFailed => "EndpointUpdateFailed",
            Self::TaskFailed => "TaskFailed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TransientInfrastructureError" => Ok(Self::TransientInfrastructureError),
            "ApprovalRejected" => Ok(Self::ApprovalRejected),
            "ApprovalExpired" => Ok(Self::ApprovalExpired),
            "ConcurrentRolloutInProgress" => Ok(Self::ConcurrentRolloutInProgress),
            "ConfigurationError" => Ok(Self::ConfigurationError),
            "AttemptsExhausted" => Ok(Self::AttemptsExhausted),
            "EndpointUpdateFailed" => Ok(Self::EndpointUpdateFailed),
            "TaskFailed" => Ok(Self::TaskFailed),
            _ => Err(format!("Invalid error code: {s}")),
        }
    }
}

/// Crate-level error for engine, store and API operations
#[derive(Debug, thiserror::Error)]
pub enum PromoterError {
    #[error("Execution not found: {0}")]
    ExecutionNotFound(uuid::Uuid),

    #[error("Pipeline not registered: {0}")]
    PipelineNotRegistered(String),

    #[error("Invalid pipeline definition: {0}")]
    InvalidDefinition(String),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("State transition error: {0}")]
    StateTransition(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type Result<T> = std::result::Result<T, PromoterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(!ErrorCode::TransientInfrastructureError.is_terminal_by_default());
        assert!(ErrorCode::ConcurrentRolloutInProgress.is_terminal_by_default());
        assert!(ErrorCode::AttemptsExhausted.is_terminal_by_default());
        assert!(ErrorCode::ApprovalExpired.is_terminal_by_default());
    }

    #[test]
    fn test_error_code_string_conversion() {
        assert_eq!(ErrorCode::ApprovalRejected.to_string(), "ApprovalRejected");
        assert_eq!(
            "ConcurrentRolloutInProgress".parse::<ErrorCode>().unwrap(),
            ErrorCode::ConcurrentRolloutInProgress
        );
        assert!("Nope".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn test_error_code_serde() {
        let json = serde_json::to_string(&ErrorCode::AttemptsExhausted).unwrap();
        assert_eq!(json, "\"AttemptsExhausted\"");
    }
}
