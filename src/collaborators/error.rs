use crate::error::ErrorCode;
use parking_lot::Mutex;
use std::collections::VecDeque;
use thiserror::Error;

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Throttling, network, or a resource briefly unavailable
    #[error("Transient failure calling {service}: {message}")]
    Transient { service: String, message: String },

    /// The collaborator refused the request; retrying will not help
    #[error("{service} rejected the request: {message}")]
    Rejected { service: String, message: String },
}

impl CollaboratorError {
    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn rejected(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Transient { .. } => ErrorCode::TransientInfrastructureError,
            Self::Rejected { .. } => ErrorCode::TaskFailed,
        }
    }
}

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Queue of failures the in-memory collaborators return before behaving normally
#[derive(Debug, Default)]
pub struct InjectedFaults {
    queue: Mutex<VecDeque<Option<CollaboratorError>>>,
}

impl InjectedFaults {
    pub fn push(&self, error: CollaboratorError, times: usize) {
        let mut queue = self.queue.lock();
        queue.extend(std::iter::repeat(Some(error)).take(times));
    }

    /// Let the next `times` calls through before any fault queued after them
    pub fn pass(&self, times: usize) {
        self.queue.lock().extend(std::iter::repeat(None).take(times));
    }

    pub fn next(&self) -> CollaboratorResult<()> {
        match self.queue.lock().pop_front() {
            Some(Some(error)) => Err(error),
            Some(None) | None => Ok(()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}
