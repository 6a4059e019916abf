//! Early stopping policies for the training loop.
//!
//! The runner consults a [`StoppingCondition`] once per training iteration
//! and once per auto-validation pass, feeding it the iteration counter and
//! the latest error of the corresponding metrics stream. Training halts
//! when the policy reports that both streams have stopped improving.
//!
//! The shipping policy, [`RollingStopping`], tracks a rolling error average
//! per stream; a window whose average stops decreasing for a configured
//! number of consecutive evaluations latches that stream's stop condition.

use std::collections::VecDeque;

/// Policy consulted by the runner to halt training.
pub trait StoppingCondition: Send {
    /// Feeds the training-stream error for `iteration`.
    fn evaluate_training(&mut self, iteration: u64, last_error: f64);

    /// Feeds the validation-stream error for `iteration`.
    fn evaluate_validation(&mut self, iteration: u64, last_error: f64);

    /// Returns whether training should stop.
    fn stop_training(&self) -> bool;
}

/// Rolling-average state for one metric stream.
#[derive(Debug, Clone)]
struct StreamCondition {
    /// Rolling-average window size in iterations.
    window: usize,
    /// Consecutive non-improving evaluations before the condition latches.
    threshold: usize,
    /// Recent errors, newest first.
    errors: VecDeque<f64>,
    /// Best (lowest) rolling average recorded so far.
    previous_average: Option<f64>,
    /// Consecutive evaluations without improvement.
    stop_count: usize,
    /// Whether the condition has latched.
    stopped: bool,
}

impl StreamCondition {
    fn new(window: usize, threshold: usize) -> Self {
        Self {
            window,
            threshold,
            errors: VecDeque::new(),
            previous_average: None,
            stop_count: 0,
            stopped: false,
        }
    }

    fn evaluate(&mut self, iteration: u64, last_error: f64) {
        if self.stopped || iteration < self.window as u64 {
            return;
        }
        if self.errors.len() == self.window {
            self.errors.pop_back();
        }
        self.errors.push_front(last_error);
        let average = self.errors.iter().sum::<f64>() / self.errors.len() as f64;

        match self.previous_average {
            Some(previous) if previous <= average => self.stop_count += 1,
            _ => {
                self.previous_average = Some(average);
                self.stop_count = 0;
            }
        }
        if self.stop_count >= self.threshold {
            self.stopped = true;
        }
    }

    fn reset(&mut self) {
        self.errors.clear();
        self.previous_average = None;
        self.stop_count = 0;
        self.stopped = false;
    }
}

/// Rolling-average early stopping over the training and validation streams.
///
/// Both streams must latch before [`StoppingCondition::stop_training`]
/// returns true; a network whose validation error plateaus while training
/// error still falls keeps training, and vice versa.
#[derive(Debug, Clone)]
pub struct RollingStopping {
    training: StreamCondition,
    validation: StreamCondition,
}

impl RollingStopping {
    /// Default rolling-average window size in iterations.
    pub const DEFAULT_WINDOW: usize = 100;

    /// Default consecutive non-improving evaluations before latching.
    pub const DEFAULT_THRESHOLD: usize = 20;

    /// Creates a policy with default windows and thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_params(
            Self::DEFAULT_WINDOW,
            Self::DEFAULT_THRESHOLD,
            Self::DEFAULT_WINDOW,
            Self::DEFAULT_THRESHOLD,
        )
    }

    /// Creates a policy with explicit per-stream windows and thresholds.
    #[must_use]
    pub fn with_params(
        training_window: usize,
        training_threshold: usize,
        validation_window: usize,
        validation_threshold: usize,
    ) -> Self {
        Self {
            training: StreamCondition::new(training_window, training_threshold),
            validation: StreamCondition::new(validation_window, validation_threshold),
        }
    }

    /// Returns whether the training-stream condition has latched.
    #[must_use]
    pub fn training_condition(&self) -> bool {
        self.training.stopped
    }

    /// Returns whether the validation-stream condition has latched.
    #[must_use]
    pub fn validation_condition(&self) -> bool {
        self.validation.stopped
    }

    /// Clears both stream conditions, e.g. when resuming training.
    pub fn reset(&mut self) {
        self.training.reset();
        self.validation.reset();
    }
}

impl Default for RollingStopping {
    fn default() -> Self {
        Self::new()
    }
}

impl StoppingCondition for RollingStopping {
    fn evaluate_training(&mut self, iteration: u64, last_error: f64) {
        self.training.evaluate(iteration, last_error);
    }

    fn evaluate_validation(&mut self, iteration: u64, last_error: f64) {
        self.validation.evaluate(iteration, last_error);
    }

    fn stop_training(&self) -> bool {
        self.training.stopped && self.validation.stopped
    }
}
