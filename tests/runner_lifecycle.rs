//! Runner lifecycle and phase handoff integration tests.

use net_trainer_rs::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Pipeline stub: identity prediction, constant or scripted error, optional
/// scripted failure on a given training call.
struct StubPipeline {
    error: f64,
    train_delay: Duration,
    fail_on_train_call: Option<u64>,
    train_calls: u64,
    targets: Option<Sequence>,
}

impl StubPipeline {
    fn new(error: f64) -> Self {
        Self {
            error,
            train_delay: Duration::ZERO,
            fail_on_train_call: None,
            train_calls: 0,
            targets: None,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.train_delay = delay;
        self
    }

    fn failing_on_call(mut self, call: u64) -> Self {
        self.fail_on_train_call = Some(call);
        self
    }
}

impl LayerPipeline for StubPipeline {
    fn train(&mut self, _inputs: &Sequence) -> Result<()> {
        self.train_calls += 1;
        if self.fail_on_train_call == Some(self.train_calls) {
            self.fail_on_train_call = None;
            return Err(NetworkError::computation("forward pass produced NaN"));
        }
        if !self.train_delay.is_zero() {
            std::thread::sleep(self.train_delay);
        }
        Ok(())
    }

    fn predict(&mut self, inputs: &Sequence) -> Result<Sequence> {
        Ok(inputs.clone())
    }

    fn backward(&mut self) -> Result<()> {
        if self.targets.is_none() {
            return Err(NetworkError::invalid_state("backward", "no targets set"));
        }
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset_state(&mut self) {}

    fn total_error(&self) -> f64 {
        self.error
    }

    fn set_targets(&mut self, targets: &Sequence) {
        self.targets = Some(targets.clone());
    }

    fn clear_targets(&mut self) {
        self.targets = None;
    }
}

/// Sampler stub producing `depth` copies of a fixed input/target pair.
struct StubSampler {
    iterations: u64,
    depth: usize,
    input: Vec<f64>,
    target: Vec<f64>,
}

impl StubSampler {
    fn new(iterations: u64) -> Self {
        Self {
            iterations,
            depth: 1,
            input: vec![0.25, 0.75],
            target: vec![0.25, 0.75],
        }
    }
}

impl Sampler for StubSampler {
    fn depth(&self) -> usize {
        self.depth
    }

    fn number_of_iterations(&self) -> u64 {
        self.iterations
    }

    fn reset(&mut self) {}

    fn get_samples(&mut self, inputs: &mut Sequence, targets: &mut Sequence) -> Result<()> {
        inputs.clear();
        targets.clear();
        for _ in 0..self.depth {
            inputs.push(self.input.clone());
            targets.push(self.target.clone());
        }
        Ok(())
    }
}

/// Snapshot hook counting its invocations.
struct CountingHook {
    cycles: Arc<AtomicU64>,
}

impl SnapshotHook for CountingHook {
    fn cycle(&mut self) -> Result<()> {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_wait_to_complete_before_start_returns_immediately() {
    let runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    assert!(runner.wait_to_complete().is_ok());
    assert!(!runner.is_processing());
}

#[test]
fn test_double_start_fails() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner.start().unwrap();
    let err = runner.start().unwrap_err();
    assert!(matches!(err, NetworkError::InvalidState { .. }));
    runner.stop().unwrap();
}

#[test]
fn test_phase_before_start_fails() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    let err = runner
        .train(Some(Box::new(StubSampler::new(1))), false, true)
        .unwrap_err();
    assert!(matches!(err, NetworkError::InvalidState { .. }));
}

#[test]
fn test_train_without_sampler_is_configuration_error() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner.start().unwrap();
    let err = runner.train(None, false, true).unwrap_err();
    assert!(matches!(err, NetworkError::Configuration { .. }));
    runner.stop().unwrap();
}

#[test]
fn test_synchronous_train_returns_to_idle() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner.start().unwrap();
    runner
        .train(Some(Box::new(StubSampler::new(10))), false, true)
        .unwrap();
    assert!(!runner.is_processing());
    assert_eq!(runner.total_iterations(), 10);
    runner.stop().unwrap();
}

#[test]
fn test_iterations_accumulate_across_train_calls() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner.start().unwrap();
    runner
        .train(Some(Box::new(StubSampler::new(4))), false, true)
        .unwrap();
    // Second call reuses the installed sampler.
    runner.train(None, false, true).unwrap();
    assert_eq!(runner.total_iterations(), 8);
    runner.stop().unwrap();
}

#[test]
fn test_abort_stops_before_target_and_returns_to_idle() {
    let pipeline = StubPipeline::new(0.1).with_delay(Duration::from_millis(5));
    let mut runner = NetworkRunner::with_defaults(pipeline).unwrap();
    runner.start().unwrap();
    runner
        .train(Some(Box::new(StubSampler::new(100))), false, false)
        .unwrap();
    std::thread::sleep(Duration::from_millis(25));
    runner.abort_execution();
    runner.wait_to_complete().unwrap();

    let total = runner.total_iterations();
    assert!(total > 0);
    assert!(total < 100, "abort should cut the run short, got {total}");
    assert!(!runner.is_processing());
    runner.stop().unwrap();
}

#[test]
fn test_phase_after_stop_fails() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner.start().unwrap();
    runner.stop().unwrap();
    assert!(runner.is_terminated());

    let err = runner
        .train(Some(Box::new(StubSampler::new(1))), false, true)
        .unwrap_err();
    assert!(matches!(err, NetworkError::InvalidState { .. }));
    let err = runner.predict(vec![vec![1.0]], true).unwrap_err();
    assert!(matches!(err, NetworkError::InvalidState { .. }));
    // Stopping twice stays quiet.
    runner.stop().unwrap();
}

#[test]
fn test_async_failure_is_captured_not_fatal() {
    let pipeline = StubPipeline::new(0.1).failing_on_call(3);
    let mut runner = NetworkRunner::with_defaults(pipeline).unwrap();
    runner.start().unwrap();
    runner
        .train(Some(Box::new(StubSampler::new(10))), false, false)
        .unwrap();

    // The phase request moved the state machine before returning, so this
    // wait observes the full pass and drains the captured failure.
    let err = runner.wait_to_complete().unwrap_err();
    assert!(matches!(
        err,
        NetworkError::WorkerFailure {
            phase: ExecutionState::Train,
            ..
        }
    ));

    // The failure is consumed exactly once and the runner stays usable.
    assert!(runner.wait_to_complete().is_ok());
    runner
        .train(Some(Box::new(StubSampler::new(5))), false, true)
        .unwrap();
    runner.stop().unwrap();
}

#[test]
fn test_predict_returns_output_without_metrics_side_effects() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner.start().unwrap();

    let inputs = vec![vec![0.1, 0.9]];
    let output = runner.predict(inputs.clone(), true).unwrap().unwrap();
    assert_eq!(output, inputs);
    assert_eq!(runner.predict_sample(&[0.3, 0.7]).unwrap(), vec![0.3, 0.7]);

    // No phase has reported into either accumulator.
    assert!(runner.training_metrics().history().is_empty());
    assert!(runner.validation_metrics().history().is_empty());
    runner.stop().unwrap();
}

#[test]
fn test_empty_predict_inputs_rejected() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner.start().unwrap();
    let err = runner.predict(Vec::new(), true).unwrap_err();
    assert!(matches!(err, NetworkError::Configuration { .. }));
    runner.stop().unwrap();
}

#[test]
fn test_validate_populates_validation_history() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner.start().unwrap();
    runner
        .validate(Some(Box::new(StubSampler::new(4))), true)
        .unwrap();

    let metrics = runner.validation_metrics();
    // Identity pipeline predicts the targets exactly: stored error is 0.
    assert_eq!(metrics.history().len(), 1);
    assert!((metrics.absolute() - 0.0).abs() < 1e-12);
    runner.stop().unwrap();
}

#[test]
fn test_auto_validation_feeds_validation_stream() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner.start().unwrap();
    runner.set_auto_validate(5).unwrap();
    runner
        .set_validation_sampler(Box::new(StubSampler::new(2)))
        .unwrap();
    runner
        .train(Some(Box::new(StubSampler::new(10))), false, true)
        .unwrap();

    let metrics = runner.validation_metrics();
    assert!(metrics.history().contains_key(&5));
    assert!(metrics.history().contains_key(&10));
    assert!(!runner.is_processing());
    runner.stop().unwrap();
}

#[test]
fn test_early_stopping_halts_training() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(1.0)).unwrap();
    runner.start().unwrap();
    runner.set_auto_validate(1).unwrap();
    runner
        .set_validation_sampler(Box::new(StubSampler::new(1)))
        .unwrap();
    // Tiny windows so the flat error latches both streams quickly.
    runner.set_early_stopping(Box::new(RollingStopping::with_params(1, 2, 1, 2)));
    runner
        .train(Some(Box::new(StubSampler::new(100))), false, true)
        .unwrap();

    let total = runner.total_iterations();
    assert!(total < 100, "early stopping should cut the run, got {total}");
    runner.stop().unwrap();
}

#[test]
fn test_snapshot_hook_cycles_once_per_iteration() {
    let cycles = Arc::new(AtomicU64::new(0));
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner.start().unwrap();
    runner.set_snapshot_hook(Box::new(CountingHook {
        cycles: Arc::clone(&cycles),
    }));
    runner
        .train(Some(Box::new(StubSampler::new(7))), false, true)
        .unwrap();
    assert_eq!(cycles.load(Ordering::SeqCst), 7);
    runner.stop().unwrap();
}

#[test]
fn test_training_history_stores_per_iteration_errors() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.25)).unwrap();
    runner.start().unwrap();
    runner
        .train(Some(Box::new(StubSampler::new(3))), false, true)
        .unwrap();

    let metrics = runner.training_metrics();
    // Per-iteration snapshots at 0, 1, 2 plus the final aggregate at 3.
    assert!((metrics.absolute_at(0) - 0.25).abs() < 1e-12);
    assert!((metrics.absolute_at(1) - 0.25).abs() < 1e-12);
    assert!((metrics.absolute_at(2) - 0.25).abs() < 1e-12);
    assert!(metrics.history().contains_key(&3));
    assert!((runner.output_error() - 0.25).abs() < 1e-12);
    runner.stop().unwrap();
}

#[test]
fn test_verbose_run_completes_normally() {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner.start().unwrap();
    runner.verbose_training(2).unwrap();
    runner.verbose_validation();
    runner.set_auto_validate(2).unwrap();
    runner
        .set_validation_sampler(Box::new(StubSampler::new(1)))
        .unwrap();
    runner
        .train(Some(Box::new(StubSampler::new(4))), false, true)
        .unwrap();
    assert_eq!(runner.total_iterations(), 4);
    runner.stop().unwrap();
}

#[test]
fn test_task_type_switch_rebuilds_validation_accumulator() {
    let mut runner = NetworkRunner::with_defaults(StubPipeline::new(0.1)).unwrap();
    runner
        .set_task_type(MetricsKind::Classification, true)
        .unwrap();
    assert_eq!(
        runner.validation_metrics().kind(),
        MetricsKind::Classification
    );
    assert!(runner.validation_metrics().multi_label());
}
