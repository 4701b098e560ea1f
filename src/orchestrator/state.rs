//! Experiment phases and the transition table.
//!
//! **Architecture**:
//! - `Phase`: the observable lifecycle state of a chaos experiment
//! - `Handler`: the side effect a `(current, target)` pair runs
//! - `transition`: the 6x6 table; every cell is defined, so there is no
//!   implicit "invalid" case, only `Handler::Unexpected`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a chaos experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Phase {
    /// First observed, nothing injected yet
    #[default]
    Uninitialized,

    /// Fault injected on every target in the finalizer set
    Running,

    /// Between two scheduled windows; nothing injected
    Waiting,

    /// Pause annotation set; faults recovered
    Paused,

    /// Last apply failed; finalizers kept for recovery
    Failed,

    /// Deleted and recovered; terminal
    Finished,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Uninitialized,
        Phase::Running,
        Phase::Waiting,
        Phase::Paused,
        Phase::Failed,
        Phase::Finished,
    ];

    /// Get the human-readable name for this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Uninitialized => "Uninitialized",
            Phase::Running => "Running",
            Phase::Waiting => "Waiting",
            Phase::Paused => "Paused",
            Phase::Failed => "Failed",
            Phase::Finished => "Finished",
        }
    }

    /// Get all targets reachable without an `unexpected` error.
    pub fn valid_next_phases(&self) -> Vec<Phase> {
        Phase::ALL
            .iter()
            .copied()
            .filter(|next| self.can_transition_to(*next))
            .collect()
    }

    /// Check if a transition to the given phase is legal.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        transition(*self, next) != Handler::Unexpected
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five transition handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    /// Set phase to the target, no side effect
    Noop,
    /// Fan out the injection and compute the next window
    Apply,
    /// Fan out recovery and stamp the end time
    Recover,
    /// Walk the schedule forward past a pause
    Resume,
    /// Structured error, state untouched
    Unexpected,
}

/// Look up the handler for a `(from, to)` pair.
pub fn transition(from: Phase, to: Phase) -> Handler {
    use Handler::*;
    use Phase::*;

    match (from, to) {
        (Uninitialized, Running) => Apply,
        (Uninitialized, Failed) => Unexpected,
        (Uninitialized, _) => Noop,

        (Running, Running) => Noop,
        (Running, Waiting) | (Running, Paused) | (Running, Finished) => Recover,
        (Running, _) => Unexpected,

        (Waiting, Running) => Apply,
        (Waiting, Uninitialized) | (Waiting, Failed) => Unexpected,
        (Waiting, _) => Noop,

        (Paused, Running) | (Paused, Waiting) => Resume,
        (Paused, Uninitialized) | (Paused, Failed) => Unexpected,
        (Paused, _) => Noop,

        (Failed, Running) => Apply,
        (Failed, Uninitialized) => Unexpected,
        (Failed, _) => Noop,

        (Finished, Finished) => Noop,
        (Finished, _) => Unexpected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Handler::*;
    use Phase::*;

    #[test]
    fn test_transition_table_matches_reference() {
        let expected = [
            // Uninit  Running  Waiting  Paused  Failed  Finished
            [Noop, Apply, Noop, Noop, Unexpected, Noop],
            [Unexpected, Noop, Recover, Recover, Unexpected, Recover],
            [Unexpected, Apply, Noop, Noop, Unexpected, Noop],
            [Unexpected, Resume, Resume, Noop, Unexpected, Noop],
            [Unexpected, Apply, Noop, Noop, Noop, Noop],
            [Unexpected, Unexpected, Unexpected, Unexpected, Unexpected, Noop],
        ];

        for (i, from) in Phase::ALL.iter().enumerate() {
            for (j, to) in Phase::ALL.iter().enumerate() {
                assert_eq!(
                    transition(*from, *to),
                    expected[i][j],
                    "cell {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_finished_is_terminal() {
        assert_eq!(Finished.valid_next_phases(), vec![Finished]);
    }

    #[test]
    fn test_failed_can_retry() {
        assert!(Failed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Uninitialized));
    }

    #[test]
    fn test_phase_serde_names() {
        let json = serde_json::to_string(&Paused).unwrap();
        assert_eq!(json, "\"Paused\"");
        let phase: Phase = serde_json::from_str("\"Waiting\"").unwrap();
        assert_eq!(phase, Waiting);
    }
}
