//! Operation controller: the state machine for the single bulk operation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use sweep_core::{
    ControlAction, ControlError, Generation, ModeParameters, OperationStatus, Processor, Stamped,
    StartRequest,
};

use crate::confirm::ConfirmationGate;
use crate::operation::{Operation, OperationSnapshot};
use crate::reconcile::{MergeOutcome, Reconciler, Signal};

/// Drives one operation at a time through
/// `Idle -> Starting -> Running <-> Paused -> {Completed, Aborted, Failed} -> Idle`.
///
/// The lock is never held across a processor call. Every state change is
/// published to [`watch`](Self::watch) subscribers.
pub struct OperationController<P> {
    processor: Arc<P>,
    gate: ConfirmationGate,
    state: Mutex<Operation>,
    changes: watch::Sender<OperationSnapshot>,
}

impl<P: Processor> OperationController<P> {
    pub fn new(processor: Arc<P>) -> Self {
        Self::with_gate(processor, ConfirmationGate::new())
    }

    pub fn with_gate(processor: Arc<P>, gate: ConfirmationGate) -> Self {
        let operation = Operation::new();
        let (changes, _) = watch::channel(operation.snapshot());
        Self {
            processor,
            gate,
            state: Mutex::new(operation),
            changes,
        }
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    pub fn status(&self) -> OperationStatus {
        self.lock().status()
    }

    pub fn generation(&self) -> Generation {
        self.lock().generation()
    }

    pub fn snapshot(&self) -> OperationSnapshot {
        self.lock().snapshot()
    }

    /// Receive a snapshot after every state change.
    pub fn watch(&self) -> watch::Receiver<OperationSnapshot> {
        self.changes.subscribe()
    }

    /// Start an operation.
    ///
    /// Requires `Idle` and a confirmation phrase matching the mode. On
    /// success returns the new generation with the operation `Running`, or
    /// already terminal if the processor finished before acknowledging.
    pub async fn start(
        &self,
        parameters: ModeParameters,
        confirmation: &str,
    ) -> Result<Generation, ControlError> {
        let mode = parameters.mode();
        let targets = parameters.target_count();

        let request = self.update(|op| {
            op.require(ControlAction::Start, &[OperationStatus::Idle])?;
            self.gate.check(mode, confirmation)?;
            let generation = op.begin(mode, targets);
            Ok::<_, ControlError>(StartRequest {
                generation,
                parameters,
            })
        })?;
        let generation = request.generation;
        info!(%mode, %generation, targets, "Starting operation");

        let result = self.processor.start_operation(request).await;

        let status = self.update(|op| {
            if op.generation() == generation {
                op.finish_start(&result)
            } else {
                op.status()
            }
        });

        match result {
            Ok(()) => {
                info!(%generation, %status, "Processor accepted operation");
                Ok(generation)
            }
            Err(err) => {
                warn!(%generation, error = %err, "Processor rejected operation");
                Err(err.into())
            }
        }
    }

    /// Ask the processor to pause.
    ///
    /// The status stays `Running` until a poll confirms the pause.
    pub async fn pause(&self) -> Result<(), ControlError> {
        let generation = self.update(|op| {
            op.require(ControlAction::Pause, &[OperationStatus::Running])?;
            op.pause_requested = true;
            Ok::<_, ControlError>(op.generation())
        })?;
        debug!(%generation, "Pause requested");

        let result = self.processor.pause_operation().await;
        if let Err(err) = &result {
            warn!(%generation, error = %err, "Pause request failed");
            self.update(|op| {
                if op.generation() == generation {
                    op.pause_requested = false;
                }
            });
        }
        result.map_err(ControlError::from)
    }

    /// Ask the processor to resume.
    ///
    /// The status stays `Paused` until a poll confirms the processor is
    /// running again.
    pub async fn resume(&self) -> Result<(), ControlError> {
        let generation = self.update(|op| {
            op.require(ControlAction::Resume, &[OperationStatus::Paused])?;
            op.resume_requested = true;
            Ok::<_, ControlError>(op.generation())
        })?;
        debug!(%generation, "Resume requested");

        let result = self.processor.resume_operation().await;
        if let Err(err) = &result {
            warn!(%generation, error = %err, "Resume request failed");
            self.update(|op| {
                if op.generation() == generation {
                    op.resume_requested = false;
                }
            });
        }
        result.map_err(ControlError::from)
    }

    /// Abort the operation.
    ///
    /// Transitions to `Aborted` at once; the processor call follows and its
    /// failure is only logged.
    pub async fn abort(&self) -> Result<(), ControlError> {
        let generation = self.update(|op| {
            op.require(
                ControlAction::Abort,
                &[OperationStatus::Running, OperationStatus::Paused],
            )?;
            op.terminate(OperationStatus::Aborted, None);
            Ok::<_, ControlError>(op.generation())
        })?;
        info!(%generation, "Operation aborted");

        if let Err(err) = self.processor.abort_operation().await {
            warn!(%generation, error = %err, "Processor abort call failed");
        }
        Ok(())
    }

    /// Dismiss a terminal operation and return to `Idle`.
    ///
    /// Returns the final snapshot.
    pub fn acknowledge(&self) -> Result<OperationSnapshot, ControlError> {
        self.update(|op| {
            op.require(
                ControlAction::Acknowledge,
                &[
                    OperationStatus::Completed,
                    OperationStatus::Aborted,
                    OperationStatus::Failed,
                ],
            )?;
            let last = op.snapshot();
            op.reset();
            Ok::<_, ControlError>(last)
        })
    }

    /// Merge a generation-stamped signal.
    pub fn apply(&self, signal: Stamped<Signal>, reconciler: &Reconciler) -> MergeOutcome {
        let generation = signal.generation;
        let outcome = self.update(|op| reconciler.merge(op, signal));
        match outcome {
            MergeOutcome::Stale => debug!(%generation, "Dropped stale signal"),
            MergeOutcome::Transitioned { from, to } => {
                info!(%generation, %from, %to, "Operation status changed");
            }
            _ => {}
        }
        outcome
    }

    /// Run `f` under the lock and publish the resulting snapshot if it
    /// changed.
    fn update<R>(&self, f: impl FnOnce(&mut Operation) -> R) -> R {
        let mut op = self.lock();
        let result = f(&mut op);
        let snapshot = op.snapshot();
        drop(op);
        self.changes.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        result
    }

    fn lock(&self) -> MutexGuard<'_, Operation> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P> std::fmt::Debug for OperationController<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationController")
            .field("gate", &self.gate)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
