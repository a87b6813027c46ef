use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

impl From<StateMachineError> for crate::error::PromoterError {
    fn from(err: StateMachineError) -> Self {
        crate::error::PromoterError::StateTransition(err.to_string())
    }
}
