use crate::collaborators::CollaboratorError;
use crate::error::ErrorCode;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by a Task executor, tagged with its taxonomy code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct StepError {
    pub code: ErrorCode,
    pub message: String,
}

impl StepError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransientInfrastructureError, message)
    }

    /// Non-retryable executor failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TaskFailed, message)
    }
}

impl From<CollaboratorError> for StepError {
    fn from(error: CollaboratorError) -> Self {
        Self::new(error.error_code(), error.to_string())
    }
}

/// What an executor sees of the execution
#[derive(Debug, Clone, Copy)]
pub struct TaskInput<'a> {
    pub execution_id: Uuid,
    pub step_name: &'a str,
    /// 1-based attempt number at this step
    pub attempt: u32,
    pub parameters: &'a Value,
    pub context: &'a Value,
}

impl<'a> TaskInput<'a> {
    /// Read a context value by JSON pointer
    pub fn read(&self, pointer: &str) -> Option<&'a Value> {
        self.context.pointer(pointer)
    }

    /// Read a required string from the context; absence is a non-retryable input error
    pub fn require_str(&self, pointer: &str) -> Result<&'a str, StepError> {
        self.read(pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StepError::failed(format!("{}: missing string at {pointer}", self.step_name))
            })
    }

    pub fn require(&self, pointer: &str) -> Result<&'a Value, StepError> {
        self.read(pointer)
            .ok_or_else(|| {
                StepError::failed(format!("{}: missing value at {pointer}", self.step_name))
            })
    }

    /// Deserialize the step's parameters; a null parameter block reads as `{}`
    pub fn parameters_as<T: DeserializeOwned>(&self) -> Result<T, StepError> {
        let parameters = match self.parameters {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        serde_json::from_value(parameters).map_err(|e| {
            StepError::new(
                ErrorCode::ConfigurationError,
                format!("{}: invalid parameters: {e}", self.step_name),
            )
        })
    }
}

/// Result of one executor invocation
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Output to write under the step's result path
    Completed(Value),
    /// Park the execution until the token is resolved
    Pending { token: String },
}

/// A unit of pipeline work bound to Task steps by name
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, input: TaskInput<'_>) -> Result<TaskOutcome, StepError>;
}
