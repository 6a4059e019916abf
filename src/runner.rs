//! Training orchestration: the per-network worker thread and its phase
//! handoff.
//!
//! A [`NetworkRunner`] owns one layer pipeline and one background worker
//! thread. Callers request phases (`train`, `predict`, `validate`) from any
//! thread; the runner serializes them through a strict state machine so at
//! most one phase executes at a time.
//!
//! # Handoff protocol
//!
//! Phase requests travel over a rendezvous channel consumed only by the
//! worker; completion is published through a shared status cell guarded by
//! a mutex and signalled on a condition variable. The sequence for a
//! caller is:
//!
//! 1. wait until the runner is idle;
//! 2. mutate shared configuration (sampler, reset flag) under its lock;
//! 3. move the state machine to the requested phase and send the request;
//! 4. optionally block until the worker publishes completion.
//!
//! Configuration written before the send is visible to the worker through
//! the configuration lock; results written before the completion signal
//! are visible to the caller through the status lock.
//!
//! # Failure capture
//!
//! A failure inside the worker loop never terminates the process. The
//! worker parks the error in the status cell, returns to idle, and the
//! next [`NetworkRunner::wait_to_complete`] — including the implicit one at
//! the start of every phase request — returns it to the caller exactly
//! once.
//!
//! # Cancellation
//!
//! [`NetworkRunner::abort_execution`] sets a cooperative flag consumed at
//! the end of each training iteration; an iteration in flight always
//! completes so pipeline and metrics state stay consistent.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::RunnerConfig;
use crate::early_stopping::StoppingCondition;
use crate::error::{NetworkError, Result};
use crate::metrics::{Metrics, MetricsKind};
use crate::state::{validate_transition, ExecutionState};
use crate::{LayerPipeline, Sampler, Sequence, SnapshotHook};

/// Phase requests consumed by the worker thread.
enum PhaseRequest {
    Train,
    Predict,
    Validate,
    Terminate,
}

/// State published by the worker and read by callers.
struct StatusInner {
    /// Current machine state.
    state: ExecutionState,

    /// Failure captured during the most recent phase, if any.
    failure: Option<NetworkError>,

    /// Output produced by the most recent prediction pass.
    output: Option<Sequence>,

    /// Scalar error reported by the pipeline after the most recent phase.
    output_error: f64,
}

/// Status cell shared between callers and the worker.
struct Status {
    inner: Mutex<StatusInner>,
    completed: Condvar,
}

/// Caller-mutable configuration read by the worker while executing.
///
/// Mutated only while the runner is idle; every mutator first waits for
/// completion.
struct SharedConfig {
    training_sampler: Option<Box<dyn Sampler>>,
    validation_sampler: Option<Box<dyn Sampler>>,
    reset_pipeline: bool,
    predict_inputs: Option<Sequence>,
    verbose_training: bool,
    verbose_validation: bool,
    verbose_cycle: u64,
    auto_validation_cycle: u64,
    stopping: Option<Box<dyn StoppingCondition>>,
    snapshot_hook: Option<Box<dyn SnapshotHook>>,
}

/// Orchestrates training, prediction and validation of one layer pipeline
/// on a dedicated worker thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut runner = NetworkRunner::new(pipeline, RunnerConfig::default())?;
/// runner.start()?;
/// runner.train(Some(Box::new(sampler)), false, true)?;
/// let metrics = runner.training_metrics();
/// runner.stop()?;
/// ```
pub struct NetworkRunner<P> {
    config: RunnerConfig,

    /// The pipeline, held until `start()` moves it into the worker.
    pipeline: Option<P>,

    sender: Option<SyncSender<PhaseRequest>>,
    handle: Option<JoinHandle<()>>,
    status: Arc<Status>,
    shared: Arc<Mutex<SharedConfig>>,
    training_metrics: Arc<Mutex<Metrics>>,
    validation_metrics: Arc<Mutex<Metrics>>,
    total_iterations: Arc<AtomicU64>,
    training_time_nanos: Arc<AtomicU64>,
    abort: Arc<AtomicBool>,
}

impl<P: LayerPipeline + 'static> NetworkRunner<P> {
    /// Creates a runner around `pipeline` with the given configuration.
    ///
    /// The worker thread is not spawned until [`NetworkRunner::start`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the configuration is invalid.
    pub fn new(pipeline: P, config: RunnerConfig) -> Result<Self> {
        config.validate()?;

        let validation_metrics = build_validation_metrics(&config)?;
        let shared = SharedConfig {
            training_sampler: None,
            validation_sampler: None,
            reset_pipeline: false,
            predict_inputs: None,
            verbose_training: false,
            verbose_validation: false,
            verbose_cycle: config.verbose_cycle,
            auto_validation_cycle: config.auto_validation_cycle,
            stopping: None,
            snapshot_hook: None,
        };

        Ok(Self {
            pipeline: Some(pipeline),
            sender: None,
            handle: None,
            status: Arc::new(Status {
                inner: Mutex::new(StatusInner {
                    state: ExecutionState::Idle,
                    failure: None,
                    output: None,
                    output_error: 0.0,
                }),
                completed: Condvar::new(),
            }),
            shared: Arc::new(Mutex::new(shared)),
            training_metrics: Arc::new(Mutex::new(build_training_metrics(&config))),
            validation_metrics: Arc::new(Mutex::new(validation_metrics)),
            total_iterations: Arc::new(AtomicU64::new(0)),
            training_time_nanos: Arc::new(AtomicU64::new(0)),
            abort: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// Creates a runner with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when construction fails.
    pub fn with_defaults(pipeline: P) -> Result<Self> {
        Self::new(pipeline, RunnerConfig::default())
    }

    /// Returns the instance name, if configured.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    /// Returns the construction-time configuration.
    ///
    /// The configuration is `Clone`; building a new runner from it is the
    /// supported way to duplicate a stopped instance.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Returns whether `start()` has been called.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.sender.is_some()
    }

    /// Spawns the worker thread, rebuilds the training accumulator and
    /// starts the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error when already started, or any error
    /// the pipeline raises while starting.
    pub fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Err(NetworkError::invalid_state(
                "start",
                "runner is already started",
            ));
        }

        let mut pipeline = self
            .pipeline
            .take()
            .ok_or_else(|| NetworkError::invalid_state("start", "pipeline is gone"))?;
        if let Err(error) = pipeline.start() {
            self.pipeline = Some(pipeline);
            return Err(error);
        }

        *self.training_metrics.lock() = build_training_metrics(&self.config);

        let (sender, receiver) = sync_channel::<PhaseRequest>(0);
        let worker_name = match &self.config.name {
            Some(name) => format!("net-trainer ({name})"),
            None => "net-trainer".to_string(),
        };

        let mut worker = Worker {
            pipeline,
            receiver,
            status: Arc::clone(&self.status),
            shared: Arc::clone(&self.shared),
            training_metrics: Arc::clone(&self.training_metrics),
            validation_metrics: Arc::clone(&self.validation_metrics),
            total_iterations: Arc::clone(&self.total_iterations),
            training_time_nanos: Arc::clone(&self.training_time_nanos),
            abort: Arc::clone(&self.abort),
            auto_validation_count: 0,
            name: worker_name.clone(),
        };

        let handle = std::thread::Builder::new()
            .name(worker_name)
            .spawn(move || worker.run())
            .map_err(|e| {
                NetworkError::configuration(format!("failed to spawn worker thread: {e}"))
            })?;

        self.status.inner.lock().state = ExecutionState::Idle;
        self.sender = Some(sender);
        self.handle = Some(handle);
        debug!(name = ?self.config.name, "runner started");
        Ok(())
    }

    /// Blocks until the runner is idle or terminated.
    ///
    /// Returns immediately when the runner was never started. A failure
    /// captured during an asynchronous phase is returned here exactly once.
    ///
    /// # Errors
    ///
    /// Returns the captured worker failure, if one is pending.
    pub fn wait_to_complete(&self) -> Result<()> {
        if !self.is_started() {
            return Ok(());
        }
        let mut inner = self.status.inner.lock();
        while inner.state.is_processing() {
            self.status.completed.wait(&mut inner);
        }
        match inner.failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Blocks until idle without consuming a captured failure.
    fn wait_idle(&self) {
        if !self.is_started() {
            return;
        }
        let mut inner = self.status.inner.lock();
        while inner.state.is_processing() {
            self.status.completed.wait(&mut inner);
        }
    }

    /// Returns whether a phase is currently executing.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.is_started() && self.status.inner.lock().state.is_processing()
    }

    /// Returns whether the runner has terminated.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.is_started() && self.status.inner.lock().state.is_terminal()
    }

    /// Requests a training pass.
    ///
    /// Blocks until the runner is idle, installs the sampler and reset
    /// flag, signals the worker, and — when `wait` is true — blocks again
    /// until the pass completes.
    ///
    /// # Arguments
    ///
    /// * `sampler` - batch source for this and subsequent passes; `None`
    ///   reuses the previously installed sampler.
    /// * `reset` - whether the pipeline state is reset at each iteration.
    /// * `wait` - whether to block until the pass completes.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error before `start()` or after `stop()`,
    /// a configuration error when no sampler is available, and — when
    /// waiting — any failure raised during the pass.
    pub fn train(
        &mut self,
        sampler: Option<Box<dyn Sampler>>,
        reset: bool,
        wait: bool,
    ) -> Result<()> {
        self.ensure_started("train")?;
        self.wait_to_complete()?;
        {
            let mut shared = self.shared.lock();
            if let Some(sampler) = sampler {
                shared.training_sampler = Some(sampler);
            }
            if shared.training_sampler.is_none() {
                return Err(NetworkError::configuration("training sampler is not set"));
            }
            shared.reset_pipeline = reset;
        }
        self.request_phase("train", ExecutionState::Train, PhaseRequest::Train)?;
        if wait {
            self.wait_to_complete()
        } else {
            Ok(())
        }
    }

    /// Requests a prediction pass over `inputs`.
    ///
    /// # Arguments
    ///
    /// * `inputs` - input sequence for the forward pass.
    /// * `wait` - whether to block and return the produced output.
    ///
    /// # Returns
    ///
    /// The produced output sequence when waiting, `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error before `start()` or after `stop()`,
    /// a configuration error for empty inputs, and — when waiting — any
    /// failure raised during the pass.
    pub fn predict(&mut self, inputs: Sequence, wait: bool) -> Result<Option<Sequence>> {
        self.ensure_started("predict")?;
        self.wait_to_complete()?;
        if inputs.is_empty() {
            return Err(NetworkError::configuration("no prediction inputs set"));
        }
        self.shared.lock().predict_inputs = Some(inputs);
        self.request_phase("predict", ExecutionState::Predict, PhaseRequest::Predict)?;
        if wait {
            self.wait_to_complete()?;
            Ok(self.status.inner.lock().output.clone())
        } else {
            Ok(None)
        }
    }

    /// Predicts the output for a single sample, waiting for completion.
    ///
    /// # Errors
    ///
    /// As [`NetworkRunner::predict`]; additionally a computation error when
    /// the pipeline produces no output.
    pub fn predict_sample(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let output = self.predict(vec![input.to_vec()], true)?;
        output
            .and_then(|sequence| sequence.into_iter().next())
            .ok_or_else(|| NetworkError::computation("pipeline produced no output"))
    }

    /// Requests a validation pass.
    ///
    /// # Arguments
    ///
    /// * `sampler` - batch source for this and subsequent passes; `None`
    ///   reuses the previously installed sampler.
    /// * `wait` - whether to block until the pass completes.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error before `start()` or after `stop()`,
    /// a configuration error when no sampler is available, and — when
    /// waiting — any failure raised during the pass.
    pub fn validate(&mut self, sampler: Option<Box<dyn Sampler>>, wait: bool) -> Result<()> {
        self.ensure_started("validate")?;
        self.wait_to_complete()?;
        {
            let mut shared = self.shared.lock();
            if let Some(sampler) = sampler {
                shared.validation_sampler = Some(sampler);
            }
            if shared.validation_sampler.is_none() {
                return Err(NetworkError::configuration(
                    "validation sampler is not set",
                ));
            }
        }
        self.request_phase("validate", ExecutionState::Validate, PhaseRequest::Validate)?;
        if wait {
            self.wait_to_complete()
        } else {
            Ok(())
        }
    }

    /// Requests cooperative cancellation of a running training pass.
    ///
    /// The flag is consulted once per iteration; the iteration in flight
    /// always completes. A no-op before `start()`.
    pub fn abort_execution(&self) {
        if self.is_started() {
            self.abort.store(true, Ordering::SeqCst);
        }
    }

    /// Terminates the worker thread.
    ///
    /// Blocks until the current phase completes, signals termination and
    /// joins the worker. Subsequent phase requests fail with an
    /// invalid-state error. A no-op when never started.
    ///
    /// # Errors
    ///
    /// Returns a failure captured during a preceding asynchronous phase.
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_started() {
            return Ok(());
        }
        let pending = self.wait_to_complete();

        let already_terminated = {
            let mut inner = self.status.inner.lock();
            let terminated = inner.state.is_terminal();
            if !terminated {
                inner.state = ExecutionState::Terminated;
            }
            terminated
        };
        if !already_terminated {
            if let Some(sender) = &self.sender {
                // A send failure means the worker is already gone.
                let _ = sender.send(PhaseRequest::Terminate);
            }
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        debug!(name = ?self.config.name, "runner stopped");
        pending
    }

    /// Returns a snapshot of the training metrics accumulator.
    ///
    /// Blocks until the runner is idle; the snapshot is consistent with the
    /// most recently completed phase.
    #[must_use]
    pub fn training_metrics(&self) -> Metrics {
        self.wait_idle();
        self.training_metrics.lock().clone()
    }

    /// Returns a snapshot of the validation metrics accumulator.
    #[must_use]
    pub fn validation_metrics(&self) -> Metrics {
        self.wait_idle();
        self.validation_metrics.lock().clone()
    }

    /// Returns the cumulative training iteration count.
    #[must_use]
    pub fn total_iterations(&self) -> u64 {
        self.wait_idle();
        self.total_iterations.load(Ordering::SeqCst)
    }

    /// Returns the cumulative training time in milliseconds.
    #[must_use]
    pub fn training_time_ms(&self) -> u64 {
        self.wait_idle();
        self.training_time_nanos.load(Ordering::SeqCst) / 1_000_000
    }

    /// Returns the cumulative training time in seconds.
    #[must_use]
    pub fn training_time_secs(&self) -> u64 {
        self.wait_idle();
        self.training_time_nanos.load(Ordering::SeqCst) / 1_000_000_000
    }

    /// Returns the pipeline's scalar error after the most recent phase.
    #[must_use]
    pub fn output_error(&self) -> f64 {
        self.wait_idle();
        self.status.inner.lock().output_error
    }

    /// Returns the output of the most recent prediction pass.
    #[must_use]
    pub fn output(&self) -> Option<Sequence> {
        self.wait_idle();
        self.status.inner.lock().output.clone()
    }

    /// Installs the training sampler.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error before `start()`.
    pub fn set_training_sampler(&mut self, sampler: Box<dyn Sampler>) -> Result<()> {
        self.ensure_started("set_training_sampler")?;
        self.wait_idle();
        self.shared.lock().training_sampler = Some(sampler);
        Ok(())
    }

    /// Installs the validation sampler.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error before `start()`.
    pub fn set_validation_sampler(&mut self, sampler: Box<dyn Sampler>) -> Result<()> {
        self.ensure_started("set_validation_sampler")?;
        self.wait_idle();
        self.shared.lock().validation_sampler = Some(sampler);
        Ok(())
    }

    /// Enables automatic validation every `cycle` training iterations.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `cycle` is zero.
    pub fn set_auto_validate(&mut self, cycle: u64) -> Result<()> {
        if cycle == 0 {
            return Err(NetworkError::configuration(
                "auto validation cycle size must be at least 1",
            ));
        }
        self.wait_idle();
        self.shared.lock().auto_validation_cycle = cycle;
        Ok(())
    }

    /// Disables automatic validation.
    pub fn unset_auto_validate(&mut self) {
        self.wait_idle();
        self.shared.lock().auto_validation_cycle = 0;
    }

    /// Enables training progress log events every `cycle` iterations.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `cycle` is zero.
    pub fn verbose_training(&mut self, cycle: u64) -> Result<()> {
        if cycle == 0 {
            return Err(NetworkError::configuration("verbose cycle must be at least 1"));
        }
        self.wait_idle();
        let mut shared = self.shared.lock();
        shared.verbose_training = true;
        shared.verbose_cycle = cycle;
        Ok(())
    }

    /// Disables training progress log events.
    pub fn unverbose_training(&mut self) {
        self.wait_idle();
        self.shared.lock().verbose_training = false;
    }

    /// Enables validation report log events, on the training verbose cycle.
    pub fn verbose_validation(&mut self) {
        self.wait_idle();
        self.shared.lock().verbose_validation = true;
    }

    /// Disables validation report log events.
    pub fn unverbose_validation(&mut self) {
        self.wait_idle();
        self.shared.lock().verbose_validation = false;
    }

    /// Rebuilds the validation accumulator for the given task type.
    ///
    /// The multi-label threshold and history capacity come from the
    /// runner's configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the configured threshold is out
    /// of range.
    pub fn set_task_type(&mut self, kind: MetricsKind, multi_label: bool) -> Result<()> {
        self.wait_idle();
        let mut config = self.config.clone();
        config.validation_metrics = kind;
        config.multi_label = multi_label;
        let metrics = build_validation_metrics(&config)?;
        self.config.validation_metrics = kind;
        self.config.multi_label = multi_label;
        *self.validation_metrics.lock() = metrics;
        Ok(())
    }

    /// Installs the early-stopping policy consulted during training.
    pub fn set_early_stopping(&mut self, stopping: Box<dyn StoppingCondition>) {
        self.wait_idle();
        self.shared.lock().stopping = Some(stopping);
    }

    /// Installs the snapshot hook invoked once per training iteration.
    pub fn set_snapshot_hook(&mut self, hook: Box<dyn SnapshotHook>) {
        self.wait_idle();
        self.shared.lock().snapshot_hook = Some(hook);
    }

    /// Removes the snapshot hook.
    pub fn remove_snapshot_hook(&mut self) {
        self.wait_idle();
        self.shared.lock().snapshot_hook = None;
    }

    fn ensure_started(&self, operation: &'static str) -> Result<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(NetworkError::invalid_state(
                operation,
                "runner is not started",
            ))
        }
    }

    /// Moves the state machine to `to` and hands the request to the worker.
    fn request_phase(
        &self,
        operation: &'static str,
        to: ExecutionState,
        request: PhaseRequest,
    ) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| NetworkError::invalid_state(operation, "runner is not started"))?;

        {
            let mut inner = self.status.inner.lock();
            while inner.state.is_processing() {
                self.status.completed.wait(&mut inner);
            }
            if inner.state.is_terminal() {
                return Err(NetworkError::invalid_state(
                    operation,
                    "runner is terminated",
                ));
            }
            validate_transition(inner.state, to)?;
            inner.state = to;
        }

        if sender.send(request).is_err() {
            let mut inner = self.status.inner.lock();
            inner.state = ExecutionState::Terminated;
            self.status.completed.notify_all();
            return Err(NetworkError::invalid_state(
                operation,
                "worker thread has exited",
            ));
        }
        Ok(())
    }
}

/// Builds the training accumulator: always regression over the pipeline's
/// scalar error, with latest-sample RMSE as the last-error value.
fn build_training_metrics(config: &RunnerConfig) -> Metrics {
    Metrics::regression()
        .with_history_capacity(config.error_history_size)
        .with_r2_last_error(false)
}

/// Builds the validation accumulator from the configured task type.
fn build_validation_metrics(config: &RunnerConfig) -> Result<Metrics> {
    let metrics = match config.validation_metrics {
        MetricsKind::Regression => Metrics::regression()
            .with_r2_last_error(config.use_r2_as_last_error),
        MetricsKind::Classification => Metrics::classification(config.multi_label)
            .with_multi_label_threshold(config.multi_label_threshold)?,
    };
    Ok(metrics.with_history_capacity(config.error_history_size))
}

/// The background worker owning the pipeline.
struct Worker<P> {
    pipeline: P,
    receiver: Receiver<PhaseRequest>,
    status: Arc<Status>,
    shared: Arc<Mutex<SharedConfig>>,
    training_metrics: Arc<Mutex<Metrics>>,
    validation_metrics: Arc<Mutex<Metrics>>,
    total_iterations: Arc<AtomicU64>,
    training_time_nanos: Arc<AtomicU64>,
    abort: Arc<AtomicBool>,
    auto_validation_count: u64,
    name: String,
}

impl<P: LayerPipeline> Worker<P> {
    fn run(&mut self) {
        debug!(worker = %self.name, "worker loop entered");
        loop {
            let request = match self.receiver.recv() {
                Ok(request) => request,
                // The runner was dropped without stop(); terminate quietly.
                Err(_) => {
                    self.publish_terminated();
                    break;
                }
            };
            match request {
                PhaseRequest::Terminate => {
                    self.pipeline.stop();
                    self.publish_terminated();
                    break;
                }
                PhaseRequest::Train => {
                    let result = self.train_phase();
                    self.complete(ExecutionState::Train, result);
                }
                PhaseRequest::Predict => {
                    let result = self.predict_phase();
                    self.complete(ExecutionState::Predict, result);
                }
                PhaseRequest::Validate => {
                    let result = self.validate_phase();
                    self.complete(ExecutionState::Validate, result);
                }
            }
        }
        debug!(worker = %self.name, "worker loop exited");
    }

    /// Publishes phase completion, capturing any failure for the next wait.
    fn complete(&mut self, phase: ExecutionState, result: Result<()>) {
        let mut inner = self.status.inner.lock();
        inner.output_error = self.pipeline.total_error();
        if let Err(error) = result {
            debug!(worker = %self.name, phase = %phase, %error, "phase failed");
            inner.failure = Some(error.into_worker_failure(phase));
        }
        inner.state = ExecutionState::Idle;
        self.status.completed.notify_all();
    }

    fn publish_terminated(&self) {
        let mut inner = self.status.inner.lock();
        inner.state = ExecutionState::Terminated;
        self.status.completed.notify_all();
    }

    /// Executes the configured number of training iterations.
    fn train_phase(&mut self) -> Result<()> {
        let mut shared_guard = self.shared.lock();
        let reset_requested = shared_guard.reset_pipeline;
        let auto_cycle = shared_guard.auto_validation_cycle;
        let verbose_training = shared_guard.verbose_training;
        let verbose_validation = shared_guard.verbose_validation;
        let verbose_cycle = shared_guard.verbose_cycle;
        let SharedConfig {
            training_sampler,
            validation_sampler,
            stopping,
            snapshot_hook,
            ..
        } = &mut *shared_guard;

        let sampler = training_sampler
            .as_mut()
            .ok_or_else(|| NetworkError::configuration("training sampler is not set"))?;

        let mut metrics = self.training_metrics.lock();
        metrics.reset();
        sampler.reset();
        let iterations = sampler.number_of_iterations();

        for _ in 0..iterations {
            let started = Instant::now();
            if reset_requested {
                self.pipeline.reset_state();
            }

            let depth = sampler.depth();
            let mut inputs = Sequence::with_capacity(depth);
            let mut targets = Sequence::with_capacity(depth);
            sampler.get_samples(&mut inputs, &mut targets)?;

            self.pipeline.set_targets(&targets);
            self.pipeline.train(&inputs)?;
            self.pipeline.backward()?;
            self.pipeline.update()?;

            self.training_time_nanos
                .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);

            let error = self.pipeline.total_error();
            let iteration = self.total_iterations.load(Ordering::SeqCst);
            metrics.report_error(error)?;
            metrics.store_and_reset(iteration);
            let total = iteration + 1;
            self.total_iterations.store(total, Ordering::SeqCst);

            if auto_cycle > 0 {
                self.auto_validation_count += 1;
                if self.auto_validation_count >= auto_cycle {
                    run_validation(
                        &mut self.pipeline,
                        validation_sampler,
                        &self.validation_metrics,
                        total,
                        verbose_validation,
                        verbose_cycle,
                    )?;
                    if let Some(stopping) = stopping.as_mut() {
                        let last = self.validation_metrics.lock().absolute();
                        stopping.evaluate_validation(total, last);
                    }
                    self.auto_validation_count = 0;
                }
            }

            if let Some(stopping) = stopping.as_mut() {
                stopping.evaluate_training(total, metrics.absolute());
            }

            if verbose_training && total % verbose_cycle == 0 {
                info!(
                    worker = %self.name,
                    iteration = total,
                    error = metrics.absolute(),
                    training_time_secs =
                        self.training_time_nanos.load(Ordering::Relaxed) / 1_000_000_000,
                    "training progress"
                );
            }

            if let Some(hook) = snapshot_hook.as_mut() {
                hook.cycle()?;
            }

            if self.abort.swap(false, Ordering::SeqCst) {
                debug!(worker = %self.name, "training aborted");
                break;
            }
            if stopping.as_ref().is_some_and(|s| s.stop_training()) {
                debug!(worker = %self.name, "early stopping triggered");
                break;
            }
        }

        // Final aggregate snapshot after the loop.
        metrics.store(self.total_iterations.load(Ordering::SeqCst));
        Ok(())
    }

    /// Executes a single forward pass with no metrics side effects.
    fn predict_phase(&mut self) -> Result<()> {
        let inputs = self
            .shared
            .lock()
            .predict_inputs
            .take()
            .ok_or_else(|| NetworkError::configuration("no prediction inputs set"))?;

        self.pipeline.clear_targets();
        let output = self.pipeline.predict(&inputs)?;
        self.status.inner.lock().output = Some(output);
        Ok(())
    }

    /// Executes a full validation pass as its own phase.
    fn validate_phase(&mut self) -> Result<()> {
        let mut shared_guard = self.shared.lock();
        let verbose_validation = shared_guard.verbose_validation;
        let verbose_cycle = shared_guard.verbose_cycle;
        let SharedConfig {
            validation_sampler, ..
        } = &mut *shared_guard;

        run_validation(
            &mut self.pipeline,
            validation_sampler,
            &self.validation_metrics,
            self.total_iterations.load(Ordering::SeqCst),
            verbose_validation,
            verbose_cycle,
        )
    }
}

/// Drives validation cycles into the validation accumulator.
///
/// Shared between the standalone validate phase and the auto-validation
/// pass nested inside training; the nested call leaves the externally
/// visible state untouched.
fn run_validation<P: LayerPipeline>(
    pipeline: &mut P,
    sampler: &mut Option<Box<dyn Sampler>>,
    validation_metrics: &Mutex<Metrics>,
    total_iterations: u64,
    verbose: bool,
    verbose_cycle: u64,
) -> Result<()> {
    let sampler = sampler
        .as_mut()
        .ok_or_else(|| NetworkError::configuration("validation sampler is not set"))?;

    let mut metrics = validation_metrics.lock();
    metrics.reset();
    sampler.reset();

    let cycles = sampler.number_of_validation_cycles();
    for _ in 0..cycles {
        let depth = sampler.depth();
        let mut inputs = Sequence::with_capacity(depth);
        let mut targets = Sequence::with_capacity(depth);
        sampler.get_samples(&mut inputs, &mut targets)?;
        let output = pipeline.predict(&inputs)?;
        metrics.report(&output, &targets)?;
    }

    if verbose && verbose_cycle > 0 && total_iterations % verbose_cycle == 0 {
        info!(iteration = total_iterations, "validation report");
        metrics.report_log();
    }
    metrics.store_and_reset(total_iterations);
    Ok(())
}
