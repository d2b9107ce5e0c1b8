//! Error types for selection and operation control.

use thiserror::Error;

use crate::mode::Mode;
use crate::model::ContainerId;
use crate::status::{ControlAction, OperationStatus};

/// Loading the children of a container failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to load items for {container}: {message}")]
pub struct FetchError {
    pub container: ContainerId,
    pub message: String,
}

impl FetchError {
    /// Create a fetch error for a container.
    pub fn new(container: ContainerId, message: impl Into<String>) -> Self {
        Self {
            container,
            message: message.into(),
        }
    }
}

/// The confirmation phrase did not match the active mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Type {expected} to confirm {mode}")]
pub struct ValidationError {
    pub mode: Mode,
    pub expected: &'static str,
}

impl ValidationError {
    /// Create a phrase mismatch error for a mode.
    pub fn phrase_mismatch(mode: Mode) -> Self {
        Self {
            mode,
            expected: mode.required_phrase(),
        }
    }
}

/// A control request arrived in a state that forbids it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot {action} while {state}")]
pub struct StateConflictError {
    pub action: ControlAction,
    pub state: OperationStatus,
}

impl StateConflictError {
    pub fn new(action: ControlAction, state: OperationStatus) -> Self {
        Self { action, state }
    }
}

/// The processor rejected a request or failed mid-flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The request was refused (e.g. invalid parameters).
    #[error("Processor rejected the request: {message}")]
    Rejected { message: String },

    /// The operation failed after it started.
    #[error("Operation failed: {message}")]
    Failed { message: String },

    /// The processor could not be reached.
    #[error("Processor unavailable: {message}")]
    Unavailable { message: String },
}

impl OperationError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Errors returned by selection changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The container is already being loaded.
    #[error("Items for {container} are still loading")]
    FetchInFlight { container: ContainerId },
}

/// Errors returned by operation control requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    StateConflict(#[from] StateConflictError),

    #[error(transparent)]
    Operation(#[from] OperationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_human_readable() {
        let err = ValidationError::phrase_mismatch(Mode::Servers);
        assert_eq!(err.to_string(), "Type LEAVE to confirm servers");

        let err = StateConflictError::new(ControlAction::Pause, OperationStatus::Idle);
        assert_eq!(err.to_string(), "Cannot pause while Idle");

        let err = FetchError::new(ContainerId::new("g1"), "timed out");
        assert_eq!(err.to_string(), "Failed to load items for g1: timed out");
    }

    #[test]
    fn test_control_error_from() {
        let err: ControlError = OperationError::rejected("no targets").into();
        assert!(matches!(err, ControlError::Operation(OperationError::Rejected { .. })));
        assert_eq!(err.to_string(), "Processor rejected the request: no targets");
    }
}
