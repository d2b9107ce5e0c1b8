//! Operation lifecycle states and control actions.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Lifecycle state of the single operation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    #[default]
    Idle,
    /// Start call issued, not yet acknowledged.
    Starting,
    Running,
    Paused,
    Completed,
    Aborted,
    Failed,
}

impl OperationStatus {
    /// Terminal states wait for an explicit acknowledgment.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }

    /// Running or paused: the processor is working on it.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Anything other than idle or terminal.
    pub fn is_in_flight(self) -> bool {
        !self.is_terminal() && self != Self::Idle
    }
}

/// A control request issued by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    Abort,
    Acknowledge,
}
