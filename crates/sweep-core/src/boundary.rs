//! Traits for the external collaborators: the child item source and the
//! processor that performs bulk operations.
//!
//! Both are asynchronous. Implementations must not block the caller's task
//! while waiting on the network or on the operation itself.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{FetchError, OperationError};
use crate::mode::ModeParameters;
use crate::model::{ChildItem, ContainerId};
use crate::signal::{Generation, PushEvent, Stamped, StatusReport};

/// Loads the children of a container on demand.
pub trait ChildSource: Send + Sync {
    /// Fetch the children of `container`.
    ///
    /// The ungrouped pseudo-container is addressed with a `None` id on the
    /// wire; see [`ContainerId::boundary_id`].
    fn fetch_children(
        &self,
        container: &ContainerId,
    ) -> impl Future<Output = Result<Vec<ChildItem>, FetchError>> + Send;
}

/// A request to start a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Generation the processor must stamp on every pushed event of this run.
    pub generation: Generation,
    pub parameters: ModeParameters,
}

/// The external processor executing one bulk operation at a time.
pub trait Processor: Send + Sync {
    /// Start an operation. Returns once the processor has accepted it.
    fn start_operation(
        &self,
        request: StartRequest,
    ) -> impl Future<Output = Result<(), OperationError>> + Send;

    fn pause_operation(&self) -> impl Future<Output = Result<(), OperationError>> + Send;

    fn resume_operation(&self) -> impl Future<Output = Result<(), OperationError>> + Send;

    fn abort_operation(&self) -> impl Future<Output = Result<(), OperationError>> + Send;

    /// Current processor status, polled periodically.
    fn operation_status(&self) -> impl Future<Output = Result<StatusReport, OperationError>> + Send;

    /// Subscribe to pushed events. Events carry the generation of the start
    /// request that produced them.
    fn subscribe(&self) -> broadcast::Receiver<Stamped<PushEvent>>;
}
