//! Progress and status signals exchanged with the processor.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Counter distinguishing signals of the current operation attempt from
/// those of earlier, already-terminated attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    /// The generation before any operation has started.
    pub const ZERO: Self = Self(0);

    /// The generation following this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Latest known progress of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Targets processed so far.
    pub processed: u64,
    /// Total targets.
    pub total: u64,
    /// Phase label reported by the processor (e.g. "scanning").
    pub label: CompactString,
    /// Units affected so far (messages removed, servers left).
    pub affected: u64,
}

impl ProgressSnapshot {
    /// Create a snapshot.
    pub fn new(processed: u64, total: u64, label: impl Into<CompactString>, affected: u64) -> Self {
        Self {
            processed,
            total,
            label: label.into(),
            affected,
        }
    }

    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total > 0 {
            (self.processed as f64 / self.total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// An event pushed by the processor as it happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PushEvent {
    Progress(ProgressSnapshot),
    Complete,
    /// The processor gave up mid-flight.
    Failed { message: String },
}

impl PushEvent {
    /// Create a progress event.
    pub fn progress(current: u64, total: u64, label: impl Into<CompactString>, affected: u64) -> Self {
        Self::Progress(ProgressSnapshot::new(current, total, label, affected))
    }

    /// Check if this event ends the operation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed { .. })
    }
}

/// Polled processor status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub running: bool,
    pub paused: bool,
    pub abort_requested: bool,
}

impl StatusReport {
    /// A running, unpaused status.
    pub fn running() -> Self {
        Self {
            running: true,
            ..Default::default()
        }
    }

    /// A paused status.
    pub fn paused() -> Self {
        Self {
            running: true,
            paused: true,
            abort_requested: false,
        }
    }

    /// A stopped status.
    pub fn stopped() -> Self {
        Self::default()
    }
}

/// A signal tagged with the generation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub generation: Generation,
    pub signal: T,
}

impl<T> Stamped<T> {
    /// Tag a signal with a generation.
    pub fn new(generation: Generation, signal: T) -> Self {
        Self { generation, signal }
    }

    /// Check if this signal belongs to `current`.
    pub fn is_current(&self, current: Generation) -> bool {
        self.generation == current
    }

    /// Convert the signal, keeping its generation.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Stamped<U> {
        Stamped {
            generation: self.generation,
            signal: f(self.signal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_next() {
        assert_eq!(Generation::ZERO.next(), Generation(1));
        assert!(Generation(2) > Generation(1));
        assert_eq!(Generation(3).to_string(), "#3");
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(ProgressSnapshot::default().percentage(), 0.0);
        let snapshot = ProgressSnapshot::new(3, 6, "deleting", 40);
        assert!((snapshot.percentage() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stamped_is_current() {
        let stamped = Stamped::new(Generation(4), PushEvent::Complete);
        assert!(stamped.is_current(Generation(4)));
        assert!(!stamped.is_current(Generation(5)));
        assert!(stamped.signal.is_terminal());
    }
}
