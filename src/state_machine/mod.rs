// Execution status state machine
//
// Running -> Suspended -> Running -> Succeeded | Failed, with the engine as the only writer.

pub mod errors;
pub mod events;
pub mod execution_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::ExecutionEvent;
pub use states::ExecutionStatus;
