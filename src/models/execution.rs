use crate::constants::context_keys;
use crate::error::ErrorCode;
use crate::state_machine::ExecutionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Terminal error recorded on a failed execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub code: ErrorCode,
    pub cause: String,
    /// Step that was active when the execution failed
    pub step: Option<String>,
}

/// One run of a pipeline for one candidate model.
///
/// Owned by the workflow engine. Everything needed to continue the run after a
/// process restart lives here: the step cursor, the retry attempt, the context
/// document and the outstanding callback token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: Uuid,
    pub pipeline_name: String,
    pub pipeline_version: String,
    /// Step to run next, or the step parked on a token while suspended
    pub current_step: Option<String>,
    /// Attempts already made at `current_step` (reset on every transition)
    pub attempt: u32,
    pub context: Value,
    pub status: ExecutionStatus,
    pub pending_token: Option<String>,
    pub error: Option<ExecutionFailure>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Create a new running execution positioned at the pipeline's first step.
    ///
    /// The submitted document is stored under `/input`; engine metadata under `/execution`.
    pub fn new(
        pipeline_name: &str,
        pipeline_version: &str,
        start_at: &str,
        input: Value,
        now: DateTime<Utc>,
    ) -> Self {
        let execution_id = Uuid::new_v4();
        let mut context = Map::new();
        context.insert(context_keys::INPUT.to_string(), input);
        context.insert(
            context_keys::EXECUTION.to_string(),
            json!({
                "id": execution_id,
                "pipeline": pipeline_name,
                "pipeline_version": pipeline_version,
                "started_at": now,
            }),
        );

        Self {
            execution_id,
            pipeline_name: pipeline_name.to_string(),
            pipeline_version: pipeline_version.to_string(),
            current_step: Some(start_at.to_string()),
            attempt: 0,
            context: Value::Object(context),
            status: ExecutionStatus::Running,
            pending_token: None,
            error: None,
            started_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    /// Write a step result under a top-level namespaced key
    pub fn write_result(&mut self, result_path: &str, value: Value) {
        if !self.context.is_object() {
            self.context = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.context {
            map.insert(result_path.to_string(), value);
        }
    }

    /// Read a value from the context by JSON pointer
    pub fn read(&self, pointer: &str) -> Option<&Value> {
        self.context.pointer(pointer)
    }

    /// Move the cursor to the next step and reset the attempt counter
    pub fn advance_to(&mut self, next: Option<String>, now: DateTime<Utc>) {
        self.current_step = next;
        self.attempt = 0;
        self.updated_at = now;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn pipeline_key(&self) -> String {
        format!("{}@{}", self.pipeline_name, self.pipeline_version)
    }
}
