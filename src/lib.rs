//! # net-trainer-rs
//!
//! Training orchestration and online metrics for layered neural networks.
//!
//! ## Overview
//!
//! This crate provides the execution core of a neural-network framework: a
//! per-network background worker that serializes training, prediction and
//! validation through a strict state machine, and a streaming metrics
//! engine whose regression and classification statistics drive convergence
//! decisions (early stopping, automatic validation) and progress
//! reporting.
//!
//! The numerical heavy lifting — layer forward/backward passes, parameter
//! updates, batch construction, checkpoint serialization — is deliberately
//! outside this crate and consumed through the [`LayerPipeline`],
//! [`Sampler`] and [`SnapshotHook`] traits.
//!
//! ## Lifecycle
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
//! A caller thread configures the runner, then invokes
//! [`train`](runner::NetworkRunner::train) /
//! [`predict`](runner::NetworkRunner::predict) /
//! [`validate`](runner::NetworkRunner::validate). The call blocks until the
//! runner is idle, installs configuration, signals the worker through a
//! rendezvous channel and optionally blocks again for completion. The
//! worker executes the phase against the pipeline, reports results into
//! the metrics accumulators and consults the early-stopping policy.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use net_trainer_rs::prelude::*;
//!
//! let mut runner = NetworkRunner::new(pipeline, RunnerConfig::default())?;
//! runner.start()?;
//! runner.set_auto_validate(100)?;
//! runner.validate(Some(Box::new(validation_sampler)), false)?;
//! runner.train(Some(Box::new(training_sampler)), false, true)?;
//! println!("iterations: {}", runner.total_iterations());
//! runner.stop()?;
//! ```
//!
//! ## Architecture
//!
//! - [`runner`] - worker thread, phase handoff and the orchestration loop
//! - [`metrics`] - streaming regression/classification statistics and the
//!   bounded error history
//! - [`early_stopping`] - rolling-average stopping policy
//! - [`state`] - execution state machine
//! - [`config`] - runner configuration and builder
//! - [`error`] - error taxonomy

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
// Precision-loss casts are acceptable in metric arithmetic.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod early_stopping;
pub mod error;
pub mod metrics;
pub mod runner;
pub mod state;

pub use config::RunnerConfig;
pub use error::{NetworkError, Result};
pub use metrics::{AverageKind, Metrics, MetricsKind};
pub use runner::NetworkRunner;
pub use state::ExecutionState;

/// One sample: a feature vector.
pub type Sample = Vec<f64>;

/// A fixed-depth batch of samples, in sampler order.
pub type Sequence = Vec<Sample>;

/// Executes layer forward/backward passes for one network.
///
/// # Why This Trait?
///
/// The runner is numerics-agnostic: it sequences phases, timing, metrics
/// and stopping decisions, while the pipeline owns the computational graph.
/// Any implementation that can run a forward pass, propagate gradients and
/// apply a parameter update can be orchestrated, regardless of the tensor
/// backend behind it.
///
/// # Thread Safety
///
/// The pipeline moves into the worker thread at
/// [`start`](runner::NetworkRunner::start) and is touched by that thread
/// only, so implementations need `Send` but not `Sync`.
pub trait LayerPipeline: Send {
    /// Prepares the pipeline for execution. Called once from
    /// [`start`](runner::NetworkRunner::start).
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Releases pipeline resources. Called once when the runner stops.
    fn stop(&mut self) {}

    /// Runs a training forward pass over `inputs`.
    fn train(&mut self, inputs: &Sequence) -> Result<()>;

    /// Runs an inference forward pass over `inputs` and returns the
    /// produced output sequence.
    fn predict(&mut self, inputs: &Sequence) -> Result<Sequence>;

    /// Propagates gradients backward from the targets set by
    /// [`LayerPipeline::set_targets`].
    fn backward(&mut self) -> Result<()>;

    /// Applies the accumulated parameter update.
    fn update(&mut self) -> Result<()>;

    /// Clears recurrent state between iterations.
    fn reset_state(&mut self);

    /// Returns the scalar total error of the most recent pass.
    fn total_error(&self) -> f64;

    /// Sets the targets the next backward pass trains toward.
    fn set_targets(&mut self, targets: &Sequence);

    /// Clears any pending targets before a pure inference pass.
    fn clear_targets(&mut self);
}

/// Supplies input/target batches for training and validation.
///
/// Equal indices of the filled input and target sequences form one
/// input/output pair.
pub trait Sampler: Send {
    /// Batch depth: the number of samples filled per
    /// [`Sampler::get_samples`] call.
    fn depth(&self) -> usize;

    /// Number of training iterations one `train` call drives.
    fn number_of_iterations(&self) -> u64;

    /// Number of cycles one validation pass drives. Defaults to the
    /// training iteration count.
    fn number_of_validation_cycles(&self) -> u64 {
        self.number_of_iterations()
    }

    /// Rewinds the sampler to the start of its data.
    fn reset(&mut self);

    /// Fills `inputs` and `targets` with the next batch.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the batch cannot be constructed.
    fn get_samples(&mut self, inputs: &mut Sequence, targets: &mut Sequence) -> Result<()>;
}

/// Periodic persistence hook invoked once per training iteration.
///
/// Snapshot format and storage are owned by the implementation; the runner
/// only guarantees the call cadence.
pub trait SnapshotHook: Send {
    /// Called once at the end of every training iteration.
    ///
    /// # Errors
    ///
    /// A returned error fails the training pass and is surfaced to the
    /// caller like any other phase failure.
    fn cycle(&mut self) -> Result<()>;
}

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use net_trainer_rs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::RunnerConfig;
    pub use crate::early_stopping::{RollingStopping, StoppingCondition};
    pub use crate::error::{NetworkError, Result};
    pub use crate::metrics::{AverageKind, Metrics, MetricsKind};
    pub use crate::runner::NetworkRunner;
    pub use crate::state::ExecutionState;
    pub use crate::{LayerPipeline, Sample, Sampler, Sequence, SnapshotHook};
}
