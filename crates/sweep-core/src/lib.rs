//! Core types and traits for sweep.
//!
//! This crate provides the data model shared by the selection and operation
//! control engine: containers and their child items, operating modes,
//! generation-tagged signals, errors, configuration and the traits that
//! external collaborators implement.

mod boundary;
mod config;
mod error;
mod mode;
mod model;
mod signal;
mod status;

pub use boundary::{ChildSource, Processor, StartRequest};
pub use config::{BridgeConfig, BridgeConfigBuilder, DEFAULT_POLL_INTERVAL_MS, EVENT_CHANNEL_SIZE};
pub use error::{
    ControlError, FetchError, OperationError, SelectionError, StateConflictError, ValidationError,
};
pub use mode::{MessagePurgeOptions, Mode, ModeParameters, ModeSpec, TargetShape, TimeRange};
pub use model::{ChildItem, Container, ContainerId, ItemId, ItemKind, UNGROUPED_ID};
pub use signal::{Generation, ProgressSnapshot, PushEvent, Stamped, StatusReport};
pub use status::{ControlAction, OperationStatus};
