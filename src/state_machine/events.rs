use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};

/// Events that can trigger execution status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ExecutionEvent {
    /// Park the execution on a callback token
    Suspend { token: String },
    /// Continue after a callback resolution
    Resume,
    /// Reached a Succeed step or implicit end
    Succeed,
    /// Reached a Fail step or an unrecoverable error
    Fail { code: ErrorCode, cause: String },
}

impl ExecutionEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Suspend { .. } => "suspend",
            Self::Resume => "resume",
            Self::Succeed => "succeed",
            Self::Fail { .. } => "fail",
        }
    }

    /// Create a failure event
    pub fn fail_with(code: ErrorCode, cause: impl Into<String>) -> Self {
        Self::Fail {
            code,
            cause: cause.into(),
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeed | Self::Fail { .. })
    }
}
