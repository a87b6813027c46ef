pub mod callback_token;
pub mod definition;
pub mod execution;

// Re-export core models for easy access
pub use callback_token::{CallbackToken, Decision, ResumeRequest, TokenOutcome};
pub use definition::{
    ChoiceRule, ChoiceStep, Condition, FailStep, PipelineDefinition, StepDefinition, TaskStep,
    WaitStep,
};
pub use execution::{Execution, ExecutionFailure};
