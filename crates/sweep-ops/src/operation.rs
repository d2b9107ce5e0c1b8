//! The single operation slot and its lifecycle transitions.

use serde::Serialize;

use sweep_core::{
    ControlAction, Generation, Mode, OperationError, OperationStatus, ProgressSnapshot,
    StateConflictError,
};

/// State of the one operation that may be in flight.
///
/// Methods here are the only way the slot changes; the controller calls them
/// under its lock and the reconciler applies signals through them.
#[derive(Debug, Clone, Default)]
pub struct Operation {
    pub(crate) status: OperationStatus,
    pub(crate) mode: Option<Mode>,
    pub(crate) generation: Generation,
    pub(crate) target_count: usize,
    pub(crate) progress: Option<ProgressSnapshot>,
    pub(crate) pause_requested: bool,
    pub(crate) resume_requested: bool,
    pub(crate) error: Option<String>,
    /// Consecutive polls that reported the processor stopped.
    pub(crate) idle_polls: u32,
    /// Terminal push received before the start call was acknowledged.
    pub(crate) pending_terminal: Option<(OperationStatus, Option<String>)>,
}

impl Operation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn progress(&self) -> Option<&ProgressSnapshot> {
        self.progress.as_ref()
    }

    /// Fail with a conflict unless the current status is one of `allowed`.
    pub(crate) fn require(
        &self,
        action: ControlAction,
        allowed: &[OperationStatus],
    ) -> Result<(), StateConflictError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(StateConflictError::new(action, self.status))
        }
    }

    /// `Idle -> Starting` under a new generation.
    pub(crate) fn begin(&mut self, mode: Mode, target_count: usize) -> Generation {
        let generation = self.generation.next();
        *self = Self {
            status: OperationStatus::Starting,
            mode: Some(mode),
            generation,
            target_count,
            ..Self::default()
        };
        generation
    }

    /// Settle `Starting` with the processor's answer to the start call.
    pub(crate) fn finish_start(&mut self, result: &Result<(), OperationError>) -> OperationStatus {
        if self.status != OperationStatus::Starting {
            return self.status;
        }
        match result {
            Ok(()) => match self.pending_terminal.take() {
                Some((status, error)) => {
                    self.status = status;
                    self.error = error;
                }
                None => self.status = OperationStatus::Running,
            },
            Err(err) => {
                self.status = OperationStatus::Failed;
                self.error = Some(err.to_string());
            }
        }
        self.status
    }

    /// Enter a terminal state.
    pub(crate) fn terminate(&mut self, status: OperationStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.error = error;
        self.pause_requested = false;
        self.resume_requested = false;
        self.idle_polls = 0;
    }

    /// Back to `Idle`, keeping the generation for the next start.
    pub(crate) fn reset(&mut self) {
        *self = Self {
            generation: self.generation,
            ..Self::default()
        };
    }

    pub fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            status: self.status,
            mode: self.mode,
            generation: self.generation,
            target_count: self.target_count,
            progress: self.progress.clone(),
            pause_requested: self.pause_requested,
            resume_requested: self.resume_requested,
            error: self.error.clone(),
        }
    }
}

/// Serializable view of the operation for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSnapshot {
    pub status: OperationStatus,
    pub mode: Option<Mode>,
    pub generation: Generation,
    pub target_count: usize,
    pub progress: Option<ProgressSnapshot>,
    /// A pause was requested and not yet confirmed by the processor.
    pub pause_requested: bool,
    pub resume_requested: bool,
    /// Human-readable reason for `Failed` or a forced `Aborted`.
    pub error: Option<String>,
}

impl OperationSnapshot {
    /// Progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        self.progress
            .as_ref()
            .map_or(0.0, ProgressSnapshot::percentage)
    }

    /// One-line summary of where the operation stands.
    pub fn summary(&self) -> String {
        let Some(mode) = self.mode else {
            return "No operation".to_string();
        };
        let spec = mode.spec();
        let (processed, total, affected) = self
            .progress
            .as_ref()
            .map_or((0, self.target_count as u64, 0), |p| {
                (p.processed, p.total, p.affected)
            });

        match self.status {
            OperationStatus::Idle => "No operation".to_string(),
            OperationStatus::Starting => format!("{} {} targets: starting", spec.action, total),
            OperationStatus::Running | OperationStatus::Paused => format!(
                "{} {}/{} ({}: {}){}",
                spec.action,
                processed,
                total,
                spec.affected_label,
                affected,
                if self.status == OperationStatus::Paused {
                    " paused"
                } else {
                    ""
                }
            ),
            OperationStatus::Completed => format!(
                "Completed {}/{} ({}: {})",
                processed, total, spec.affected_label, affected
            ),
            OperationStatus::Aborted => format!("Aborted at {}/{}", processed, total),
            OperationStatus::Failed => format!(
                "Failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_increments_generation() {
        let mut op = Operation::new();
        assert_eq!(op.generation(), Generation::ZERO);

        let first = op.begin(Mode::Messages, 3);
        assert_eq!(first, Generation(1));
        assert_eq!(op.status(), OperationStatus::Starting);

        op.terminate(OperationStatus::Completed, None);
        op.reset();
        assert_eq!(op.status(), OperationStatus::Idle);
        assert_eq!(op.generation(), Generation(1));

        assert_eq!(op.begin(Mode::Servers, 1), Generation(2));
    }

    #[test]
    fn test_finish_start_fast_fails() {
        let mut op = Operation::new();
        op.begin(Mode::Messages, 0);
        let status = op.finish_start(&Err(OperationError::rejected("no targets")));
        assert_eq!(status, OperationStatus::Failed);
        assert!(op.snapshot().error.unwrap().contains("no targets"));
    }

    #[test]
    fn test_finish_start_applies_pending_terminal() {
        let mut op = Operation::new();
        op.begin(Mode::Messages, 1);
        op.pending_terminal = Some((OperationStatus::Completed, None));
        assert_eq!(op.finish_start(&Ok(())), OperationStatus::Completed);
    }

    #[test]
    fn test_reset_clears_progress() {
        let mut op = Operation::new();
        op.begin(Mode::Messages, 2);
        op.finish_start(&Ok(()));
        op.progress = Some(ProgressSnapshot::new(1, 2, "deleting", 5));
        op.terminate(OperationStatus::Aborted, None);
        op.reset();
        assert!(op.progress().is_none());
        assert!(op.snapshot().mode.is_none());
    }

    #[test]
    fn test_summary() {
        let mut op = Operation::new();
        assert_eq!(op.snapshot().summary(), "No operation");

        op.begin(Mode::Messages, 6);
        op.finish_start(&Ok(()));
        op.progress = Some(ProgressSnapshot::new(3, 6, "deleting", 120));
        assert_eq!(
            op.snapshot().summary(),
            "Purging 3/6 (Messages removed: 120)"
        );
        assert!((op.snapshot().percentage() - 50.0).abs() < f64::EPSILON);

        op.terminate(OperationStatus::Failed, Some("rate limited".to_string()));
        assert_eq!(op.snapshot().summary(), "Failed: rate limited");
    }
}
