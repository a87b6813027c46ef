use super::errors::{StateMachineError, StateMachineResult};
use super::events::ExecutionEvent;
use super::states::ExecutionStatus;
use crate::models::{Execution, ExecutionFailure};
use chrono::{DateTime, Utc};

/// Determine the target status based on current status and event
pub fn determine_target_state(
    current: ExecutionStatus,
    event: &ExecutionEvent,
) -> StateMachineResult<ExecutionStatus> {
    let target = match (current, event) {
        (ExecutionStatus::Running, ExecutionEvent::Suspend { .. }) => ExecutionStatus::Suspended,
        (ExecutionStatus::Suspended, ExecutionEvent::Resume) => ExecutionStatus::Running,
        (ExecutionStatus::Running, ExecutionEvent::Succeed) => ExecutionStatus::Succeeded,
        (ExecutionStatus::Running, ExecutionEvent::Fail { .. }) => ExecutionStatus::Failed,
        // Rejected or expired approvals fail straight out of suspension
        (ExecutionStatus::Suspended, ExecutionEvent::Fail { .. }) => ExecutionStatus::Failed,
        (from, _) => {
            return Err(StateMachineError::InvalidTransition {
                from: from.to_string(),
                event: event.event_type().to_string(),
            })
        }
    };
    Ok(target)
}

/// Apply an event to an execution, updating status, token, error and timestamps
pub fn apply(
    execution: &mut Execution,
    event: ExecutionEvent,
    now: DateTime<Utc>,
) -> StateMachineResult<ExecutionStatus> {
    let target = determine_target_state(execution.status, &event)?;

    match event {
        ExecutionEvent::Suspend { token } => {
            execution.pending_token = Some(token);
        }
        ExecutionEvent::Resume => {
            execution.pending_token = None;
        }
        ExecutionEvent::Succeed => {
            execution.ended_at = Some(now);
        }
        ExecutionEvent::Fail { code, cause } => {
            execution.pending_token = None;
            execution.error = Some(ExecutionFailure {
                code,
                cause,
                step: execution.current_step.clone(),
            });
            execution.ended_at = Some(now);
        }
    }

    execution.status = target;
    execution.updated_at = now;
    Ok(target)
}
