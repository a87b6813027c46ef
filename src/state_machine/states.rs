use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution status of one promotion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Driving steps
    Running,
    /// Parked on an outstanding callback token; no resources held
    Suspended,
    /// Reached a Succeed step or an implicit end
    Succeeded,
    /// Reached a Fail step or an unrecoverable error
    Failed,
}

impl ExecutionStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Check if the execution is waiting on an external event
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Suspended => "Suspended",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Running" => Ok(Self::Running),
            "Suspended" => Ok(Self::Suspended),
            "Succeeded" => Ok(Self::Succeeded),
            "Failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid execution status: {s}")),
        }
    }
}

/// Default status for new executions
impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Running
    }
}
