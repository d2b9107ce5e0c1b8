//! Merging pushed events and polled status into the operation slot.
//!
//! Every signal is tagged with a generation. Signals from another generation
//! are stale and dropped. Pushed events are authoritative; polls only
//! confirm pause/resume and detect a processor that stopped without saying
//! so.

use sweep_core::{BridgeConfig, OperationStatus, PushEvent, Stamped, StatusReport};

use crate::operation::Operation;

/// An inbound signal about the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Push(PushEvent),
    Poll(StatusReport),
}

/// What a merge did to the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Generation mismatch; nothing changed.
    Stale,
    /// Current, but meaningless in the present state.
    Ignored,
    /// Progress or bookkeeping updated, status unchanged.
    Updated,
    Transitioned {
        from: OperationStatus,
        to: OperationStatus,
    },
}

const STOPPED_WITHOUT_COMPLETION: &str = "Processor stopped without reporting completion";
const ABORTED_EXTERNALLY: &str = "Processor reported an abort request";

/// The merge policy.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    idle_polls_before_abort: u32,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            idle_polls_before_abort: 1,
        }
    }
}

impl Reconciler {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            idle_polls_before_abort: config.idle_polls_before_abort.max(1),
        }
    }

    /// Apply one signal to the operation.
    pub fn merge(&self, op: &mut Operation, signal: Stamped<Signal>) -> MergeOutcome {
        if !signal.is_current(op.generation) {
            return MergeOutcome::Stale;
        }

        let from = op.status;
        let outcome = match signal.signal {
            Signal::Push(event) => merge_push(op, event),
            Signal::Poll(report) => self.merge_poll(op, report),
        };

        match outcome {
            MergeOutcome::Updated if op.status != from => MergeOutcome::Transitioned {
                from,
                to: op.status,
            },
            other => other,
        }
    }

    fn merge_poll(&self, op: &mut Operation, report: StatusReport) -> MergeOutcome {
        if !op.status.is_active() {
            return MergeOutcome::Ignored;
        }

        if !report.running {
            op.idle_polls += 1;
            if op.idle_polls >= self.idle_polls_before_abort {
                op.terminate(
                    OperationStatus::Aborted,
                    Some(STOPPED_WITHOUT_COMPLETION.to_string()),
                );
            }
            return MergeOutcome::Updated;
        }
        op.idle_polls = 0;

        if report.abort_requested {
            op.terminate(OperationStatus::Aborted, Some(ABORTED_EXTERNALLY.to_string()));
            return MergeOutcome::Updated;
        }

        match (op.status, report.paused) {
            (OperationStatus::Running, true) => {
                op.status = OperationStatus::Paused;
                op.pause_requested = false;
                MergeOutcome::Updated
            }
            (OperationStatus::Paused, false) => {
                op.status = OperationStatus::Running;
                op.resume_requested = false;
                MergeOutcome::Updated
            }
            _ => MergeOutcome::Ignored,
        }
    }
}

fn merge_push(op: &mut Operation, event: PushEvent) -> MergeOutcome {
    let starting = op.status == OperationStatus::Starting;
    if !starting && !op.status.is_active() {
        return MergeOutcome::Ignored;
    }

    match event {
        // Latest accepted value wins; no monotonic clamp.
        PushEvent::Progress(progress) => {
            op.progress = Some(progress);
        }
        PushEvent::Complete if starting => {
            op.pending_terminal = Some((OperationStatus::Completed, None));
        }
        PushEvent::Complete => op.terminate(OperationStatus::Completed, None),
        PushEvent::Failed { message } if starting => {
            op.pending_terminal = Some((OperationStatus::Failed, Some(message)));
        }
        PushEvent::Failed { message } => op.terminate(OperationStatus::Failed, Some(message)),
    }
    MergeOutcome::Updated
}
