//! Selection and operation control for sweep.
//!
//! This crate provides:
//! - Lazily populated container/child selection with rollback on fetch failure
//! - The confirmation gate guarding destructive operations
//! - The operation state machine and its controller
//! - The event bridge merging pushed events with status polls

mod bridge;
mod confirm;
mod controller;
mod operation;
mod reconcile;
mod selection;

pub use bridge::{BridgeHandle, EventBridge};
pub use confirm::{ConfirmationGate, ConfirmationInput};
pub use controller::OperationController;
pub use operation::{Operation, OperationSnapshot};
pub use reconcile::{MergeOutcome, Reconciler, Signal};
pub use selection::{
    PendingToggle, SelectionCoordinator, SelectionSnapshot, SelectionState,
    ToggleOutcome, ToggleStep,
};
