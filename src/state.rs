//! Execution state machine for the network runner.
//!
//! A runner instance holds exactly one [`ExecutionState`] at a time, mutated
//! only while the status lock is held. The lifecycle is:
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            ▼                              │
//!  IDLE ──▶ TRAIN / PREDICT / VALIDATE ─────┘
//!   │           (worker completes)
//!   │
//!   └──▶ TERMINATED   (absorbing)
//! ```
//!
//! `Terminated` is absorbing: once reached, every phase request fails with
//! an invalid-state error rather than silently doing nothing.

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};

/// Lifecycle states of a network runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionState {
    /// The worker is parked, waiting for a phase request.
    Idle,

    /// The worker is executing training iterations.
    Train,

    /// The worker is executing a single prediction pass.
    Predict,

    /// The worker is executing validation cycles.
    Validate,

    /// The worker has exited. No further operations are valid.
    Terminated,
}

impl ExecutionState {
    /// Returns a human-readable name for the state.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Train => "train",
            ExecutionState::Predict => "predict",
            ExecutionState::Validate => "validate",
            ExecutionState::Terminated => "terminated",
        }
    }

    /// Returns whether a phase is currently executing.
    ///
    /// `Idle` and `Terminated` are the only non-processing states.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        !matches!(self, ExecutionState::Idle | ExecutionState::Terminated)
    }

    /// Returns whether this state is absorbing.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Terminated)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Validates that a state transition is legal.
///
/// Phase states are entered only from `Idle` and always return to `Idle`.
/// `Terminated` is entered only from `Idle` and never left.
///
/// # Errors
///
/// Returns an invalid-state error if the transition is not allowed.
pub fn validate_transition(from: ExecutionState, to: ExecutionState) -> Result<()> {
    use ExecutionState::{Idle, Predict, Terminated, Train, Validate};

    let valid = match (from, to) {
        // Idle accepts any phase request and termination.
        (Idle, Train | Predict | Validate | Terminated) => true,

        // A completing phase returns to idle.
        (Train | Predict | Validate, Idle) => true,

        // Terminated is absorbing.
        (Terminated, _) => false,

        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(NetworkError::invalid_state(
            "transition",
            format!("cannot move from {from} to {to}"),
        ))
    }
}
