//! Error types for network training orchestration.
//!
//! This module defines the error hierarchy shared by the execution runner
//! and the metrics engine. Errors carry enough context to act on:
//!
//! - **Configuration**: a collaborator or parameter is missing or out of
//!   range. Raised synchronously at the offending call.
//! - **InvalidState**: the operation is not legal for the runner's current
//!   lifecycle state (double start, phase request before start or after
//!   termination). Raised synchronously at the offending call.
//! - **Computation**: surfaced from the layer pipeline during a forward or
//!   backward pass.
//! - **WorkerFailure**: any failure raised inside the worker thread while a
//!   phase was executing asynchronously. The failure is parked in the
//!   runner's status cell and returned by the next
//!   [`wait_to_complete`](crate::runner::NetworkRunner::wait_to_complete);
//!   the worker never brings down the host process.

use thiserror::Error;

use crate::state::ExecutionState;

/// The main error type for network training orchestration.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// A collaborator or parameter is missing or invalid.
    #[error("configuration error: {detail}")]
    Configuration {
        /// Description of the configuration issue.
        detail: String,
    },

    /// The operation is not valid for the runner's current state.
    #[error("`{operation}` is not valid: {reason}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// Why the operation is rejected.
        reason: String,
    },

    /// The layer pipeline failed during a forward or backward pass.
    #[error("computation error: {detail}")]
    Computation {
        /// Description of the computation failure.
        detail: String,
    },

    /// A failure captured inside the worker thread during an asynchronous
    /// phase. Returned by the next wait on the runner.
    #[error("worker failure during {phase} phase: {source}")]
    WorkerFailure {
        /// The phase that was executing when the failure occurred.
        phase: ExecutionState,
        /// The underlying failure.
        #[source]
        source: Box<NetworkError>,
    },
}

impl NetworkError {
    /// Creates a configuration error.
    pub fn configuration(detail: impl Into<String>) -> Self {
        Self::Configuration {
            detail: detail.into(),
        }
    }

    /// Creates an invalid-state error.
    pub fn invalid_state(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            operation,
            reason: reason.into(),
        }
    }

    /// Creates a computation error.
    pub fn computation(detail: impl Into<String>) -> Self {
        Self::Computation {
            detail: detail.into(),
        }
    }

    /// Wraps this error as a worker failure captured during `phase`.
    #[must_use]
    pub fn into_worker_failure(self, phase: ExecutionState) -> Self {
        Self::WorkerFailure {
            phase,
            source: Box::new(self),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NetworkError>;
