//! Online training and validation metrics.
//!
//! A [`Metrics`] accumulator is created once per logical stream (training or
//! validation) with a fixed variant — regression or classification — and
//! never switches variant afterwards. The variant is a tagged payload; no
//! runtime type inspection happens after construction.
//!
//! Both variants share one capability surface: `report` predicted/actual
//! pairs (or a scalar error), `store` a history snapshot keyed by the
//! global iteration counter, query the bounded history for trends, and
//! `reference()` a fresh accumulator with identical configuration for a
//! mirrored stream.
//!
//! # Classification rule
//!
//! Raw predicted vectors are binarized before counting:
//!
//! - *single-label*: every entry equal to the vector maximum is positive —
//!   ties produce multiple positives, not a first-wins pick;
//! - *multi-label*: every entry at or above the configured threshold
//!   (default 0.5) is positive.

mod classification;
mod history;
mod regression;

pub use classification::{AverageKind, ClassificationStats};
pub use history::{ErrorHistory, DEFAULT_HISTORY_CAPACITY};
pub use regression::RegressionStats;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::error::{NetworkError, Result};
use crate::Sequence;

/// Metric variant selected at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricsKind {
    /// Streaming error sums, RMSE and R² over continuous outputs.
    #[default]
    Regression,

    /// Confusion bookkeeping and contingency scores over binarized outputs.
    Classification,
}

/// Variant payload holding the accumulated state.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Accumulator {
    Regression(RegressionStats),
    Classification(ClassificationStats),
}

/// Serializable snapshot of derived regression scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionScores {
    /// Mean absolute error over the accumulated window.
    pub mean_absolute_error: f64,
    /// Mean squared error over the accumulated window.
    pub mean_squared_error: f64,
    /// Root-mean-square error over the accumulated window.
    pub rmse: f64,
    /// Mean R² over defined output dimensions, if any.
    pub r2: Option<f64>,
}

/// Serializable snapshot of derived classification scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationScores {
    /// Averaging mode the scores were computed under.
    pub average: AverageKind,
    /// Accuracy.
    pub accuracy: f64,
    /// Error rate.
    pub error_rate: f64,
    /// Precision.
    pub precision: f64,
    /// Recall.
    pub recall: f64,
    /// Specificity.
    pub specificity: f64,
    /// F1 score.
    pub f1: f64,
}

/// Streaming metrics accumulator with a bounded error history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    kind: MetricsKind,
    average: AverageKind,
    multi_label: bool,
    multi_label_threshold: f64,
    use_r2_as_last_error: bool,
    accumulator: Accumulator,
    history: ErrorHistory,
    /// Exponentially smoothed R² across stored snapshots.
    average_r2: Option<f64>,
}

impl Metrics {
    /// Creates an accumulator of the given variant with default settings.
    #[must_use]
    pub fn new(kind: MetricsKind) -> Self {
        let accumulator = match kind {
            MetricsKind::Regression => Accumulator::Regression(RegressionStats::new(true)),
            MetricsKind::Classification => {
                Accumulator::Classification(ClassificationStats::new())
            }
        };
        Self {
            kind,
            average: AverageKind::Macro,
            multi_label: false,
            multi_label_threshold: 0.5,
            use_r2_as_last_error: true,
            accumulator,
            history: ErrorHistory::default(),
            average_r2: None,
        }
    }

    /// Creates a regression accumulator.
    #[must_use]
    pub fn regression() -> Self {
        Self::new(MetricsKind::Regression)
    }

    /// Creates a classification accumulator.
    #[must_use]
    pub fn classification(multi_label: bool) -> Self {
        let mut metrics = Self::new(MetricsKind::Classification);
        metrics.multi_label = multi_label;
        metrics
    }

    /// Sets the history retention capacity (builder style).
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = ErrorHistory::new(capacity);
        self
    }

    /// Sets the averaging mode for classification scores (builder style).
    #[must_use]
    pub fn with_average(mut self, average: AverageKind) -> Self {
        self.average = average;
        self
    }

    /// Sets the multi-label positive threshold (builder style).
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the threshold is outside [0, 1].
    pub fn with_multi_label_threshold(mut self, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(NetworkError::configuration(
                "multi label threshold must be between 0 and 1",
            ));
        }
        self.multi_label_threshold = threshold;
        Ok(self)
    }

    /// Selects R² (true) or latest-sample RMSE (false) as the regression
    /// last-error value (builder style).
    #[must_use]
    pub fn with_r2_last_error(mut self, use_r2: bool) -> Self {
        self.use_r2_as_last_error = use_r2;
        if let Accumulator::Regression(ref mut stats) = self.accumulator {
            *stats = RegressionStats::new(use_r2);
        }
        self
    }

    /// Returns the metric variant.
    #[must_use]
    pub fn kind(&self) -> MetricsKind {
        self.kind
    }

    /// Returns the averaging mode.
    #[must_use]
    pub fn average_kind(&self) -> AverageKind {
        self.average
    }

    /// Changes the averaging mode for classification scores.
    pub fn set_average_kind(&mut self, average: AverageKind) {
        self.average = average;
    }

    /// Returns whether the multi-label rule is active.
    #[must_use]
    pub fn multi_label(&self) -> bool {
        self.multi_label
    }

    /// Returns the multi-label positive threshold.
    #[must_use]
    pub fn multi_label_threshold(&self) -> f64 {
        self.multi_label_threshold
    }

    /// Produces a fresh accumulator with identical configuration and empty
    /// state, used to mirror a stream's configuration onto another stream.
    #[must_use]
    pub fn reference(&self) -> Self {
        let accumulator = match &self.accumulator {
            Accumulator::Regression(stats) => Accumulator::Regression(stats.reference()),
            Accumulator::Classification(_) => {
                Accumulator::Classification(ClassificationStats::new())
            }
        };
        Self {
            kind: self.kind,
            average: self.average,
            multi_label: self.multi_label,
            multi_label_threshold: self.multi_label_threshold,
            use_r2_as_last_error: self.use_r2_as_last_error,
            accumulator,
            history: ErrorHistory::new(self.history.capacity()),
            average_r2: None,
        }
    }

    /// Clears accumulated counts, preserving configuration and history.
    pub fn reset(&mut self) {
        match &mut self.accumulator {
            Accumulator::Regression(stats) => stats.reset(),
            Accumulator::Classification(stats) => stats.reset(),
        }
    }

    /// Clears accumulated counts and the error history.
    pub fn reset_all(&mut self) {
        self.reset();
        self.history.clear();
        self.average_r2 = None;
    }

    /// Reports a predicted/actual sequence pair.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the sequences differ in length,
    /// when a classification report carries no samples, or on a sample
    /// dimension mismatch.
    pub fn report(&mut self, predicted: &Sequence, actual: &Sequence) -> Result<()> {
        if predicted.len() != actual.len() {
            return Err(NetworkError::configuration(format!(
                "predicted sequence length {} does not match actual length {}",
                predicted.len(),
                actual.len()
            )));
        }
        if matches!(self.kind, MetricsKind::Classification) && actual.is_empty() {
            return Err(NetworkError::configuration("nothing to classify"));
        }
        for (p, a) in predicted.iter().zip(actual.iter()) {
            self.report_sample(p, a)?;
        }
        Ok(())
    }

    /// Reports a single predicted/actual sample pair.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on a dimension mismatch.
    pub fn report_sample(&mut self, predicted: &[f64], actual: &[f64]) -> Result<()> {
        match &mut self.accumulator {
            Accumulator::Regression(stats) => stats.update(predicted, actual),
            Accumulator::Classification(stats) => {
                let positives =
                    classify(predicted, self.multi_label, self.multi_label_threshold);
                stats.update(&positives, actual);
                Ok(())
            }
        }
    }

    /// Reports a single scalar error value. Ignored by classification
    /// accumulators.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when scalar and vector reports are
    /// mixed in one regression accumulator.
    pub fn report_error(&mut self, error: f64) -> Result<()> {
        match &mut self.accumulator {
            Accumulator::Regression(stats) => stats.update_scalar(error),
            Accumulator::Classification(_) => Ok(()),
        }
    }

    /// Stores the current error snapshot into the history at `iteration`.
    ///
    /// Regression stores the mean absolute error of the accumulated window
    /// and folds the current R² (when defined) into the smoothed R² as
    /// `0.9 · avg + 0.1 · current`; classification stores
    /// `1 − accuracy` under the configured averaging mode.
    pub fn store(&mut self, iteration: u64) {
        let snapshot = match &self.accumulator {
            Accumulator::Regression(stats) => {
                if let Some(current) = stats.r2() {
                    self.average_r2 = Some(match self.average_r2 {
                        Some(avg) => 0.9 * avg + 0.1 * current,
                        None => current,
                    });
                }
                stats.mean_absolute_error()
            }
            Accumulator::Classification(stats) => 1.0 - stats.accuracy(self.average),
        };
        self.history.store(iteration, snapshot);
    }

    /// Stores the current error snapshot and resets the accumulated counts.
    pub fn store_and_reset(&mut self, iteration: u64) {
        self.store(iteration);
        self.reset();
    }

    /// Returns the variant's last-error value: the configured R²/RMSE for
    /// regression, the F1 score for classification.
    #[must_use]
    pub fn last_error(&self) -> f64 {
        match &self.accumulator {
            Accumulator::Regression(stats) => stats.last_error(),
            Accumulator::Classification(stats) => stats.f1_score(self.average),
        }
    }

    /// Exponentially smoothed R² across stored snapshots, if any regression
    /// snapshot has produced a defined R².
    #[must_use]
    pub fn average_r2(&self) -> Option<f64> {
        self.average_r2
    }

    // ------------------------------------------------------------------
    // History queries
    // ------------------------------------------------------------------

    /// Most recent history entry, or 0 when the history is empty.
    #[must_use]
    pub fn absolute(&self) -> f64 {
        self.history.absolute()
    }

    /// History entry at `iteration`, or 0 when absent.
    #[must_use]
    pub fn absolute_at(&self, iteration: u64) -> f64 {
        self.history.absolute_at(iteration)
    }

    /// Mean of the `last_n` most recent history entries.
    #[must_use]
    pub fn average(&self, last_n: usize) -> f64 {
        self.history.average(last_n)
    }

    /// Minimum of the `last_n` most recent history entries.
    #[must_use]
    pub fn min(&self, last_n: usize) -> f64 {
        self.history.min(last_n)
    }

    /// Maximum of the `last_n` most recent history entries.
    #[must_use]
    pub fn max(&self, last_n: usize) -> f64 {
        self.history.max(last_n)
    }

    /// Exponentially smoothed trend over the `last_n` most recent entries;
    /// see [`ErrorHistory::moving_average`] for the exact semantics.
    #[must_use]
    pub fn moving_average(&self, last_n: usize) -> BTreeMap<u64, f64> {
        self.history.moving_average(last_n)
    }

    /// The retained history entries keyed by iteration.
    #[must_use]
    pub fn history(&self) -> &BTreeMap<u64, f64> {
        self.history.entries()
    }

    // ------------------------------------------------------------------
    // Regression accessors
    // ------------------------------------------------------------------

    /// Number of samples accumulated since the last reset.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        match &self.accumulator {
            Accumulator::Regression(stats) => stats.error_count(),
            Accumulator::Classification(stats) => stats.total_count(),
        }
    }

    /// Mean absolute error of the accumulated regression window.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for classification accumulators.
    pub fn mean_absolute_error(&self) -> Result<f64> {
        Ok(self.regression_stats("mean_absolute_error")?.mean_absolute_error())
    }

    /// Mean squared error of the accumulated regression window.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for classification accumulators.
    pub fn mean_squared_error(&self) -> Result<f64> {
        Ok(self.regression_stats("mean_squared_error")?.mean_squared_error())
    }

    /// Root-mean-square error of the accumulated regression window.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for classification accumulators.
    pub fn rmse(&self) -> Result<f64> {
        Ok(self.regression_stats("rmse")?.rmse())
    }

    /// Mean R² over defined output dimensions, or `None` when undefined.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for classification accumulators.
    pub fn r2(&self) -> Result<Option<f64>> {
        Ok(self.regression_stats("r2")?.r2())
    }

    /// Per-dimension R² values; zero-variance dimensions read `None`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for classification accumulators.
    pub fn r2_values(&self) -> Result<Vec<Option<f64>>> {
        Ok(self.regression_stats("r2_values")?.r2_values())
    }

    /// Derived regression scores as a serializable snapshot.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for classification accumulators.
    pub fn regression_scores(&self) -> Result<RegressionScores> {
        let stats = self.regression_stats("regression_scores")?;
        Ok(RegressionScores {
            mean_absolute_error: stats.mean_absolute_error(),
            mean_squared_error: stats.mean_squared_error(),
            rmse: stats.rmse(),
            r2: stats.r2(),
        })
    }

    fn regression_stats(&self, operation: &'static str) -> Result<&RegressionStats> {
        match &self.accumulator {
            Accumulator::Regression(stats) => Ok(stats),
            Accumulator::Classification(_) => Err(NetworkError::invalid_state(
                operation,
                "not a regression metric",
            )),
        }
    }

    // ------------------------------------------------------------------
    // Classification accessors
    // ------------------------------------------------------------------

    /// Accuracy under the configured averaging mode.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for regression accumulators.
    pub fn accuracy(&self) -> Result<f64> {
        Ok(self.classification_stats("accuracy")?.accuracy(self.average))
    }

    /// Error rate under the configured averaging mode.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for regression accumulators.
    pub fn error_rate(&self) -> Result<f64> {
        Ok(self
            .classification_stats("error_rate")?
            .error_rate(self.average))
    }

    /// Precision under the configured averaging mode.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for regression accumulators.
    pub fn precision(&self) -> Result<f64> {
        Ok(self
            .classification_stats("precision")?
            .precision(self.average))
    }

    /// Recall under the configured averaging mode.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for regression accumulators.
    pub fn recall(&self) -> Result<f64> {
        Ok(self.classification_stats("recall")?.recall(self.average))
    }

    /// Specificity under the configured averaging mode.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for regression accumulators.
    pub fn specificity(&self) -> Result<f64> {
        Ok(self
            .classification_stats("specificity")?
            .specificity(self.average))
    }

    /// F1 score under the configured averaging mode.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for regression accumulators.
    pub fn f1_score(&self) -> Result<f64> {
        Ok(self.classification_stats("f1_score")?.f1_score(self.average))
    }

    /// Confusion count for a predicted/actual feature pair.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for regression accumulators.
    pub fn confusion(&self, predicted: usize, actual: usize) -> Result<u64> {
        Ok(self
            .classification_stats("confusion")?
            .confusion(predicted, actual))
    }

    /// The sparse confusion mapping.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for regression accumulators.
    pub fn confusion_matrix(&self) -> Result<&HashMap<usize, HashMap<usize, u64>>> {
        Ok(self
            .classification_stats("confusion_matrix")?
            .confusion_matrix())
    }

    /// The classification contingency accumulator.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for regression accumulators.
    pub fn classification_stats_ref(&self) -> Result<&ClassificationStats> {
        self.classification_stats("classification_stats")
    }

    /// Derived classification scores as a serializable snapshot.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for regression accumulators.
    pub fn classification_scores(&self) -> Result<ClassificationScores> {
        let stats = self.classification_stats("classification_scores")?;
        Ok(ClassificationScores {
            average: self.average,
            accuracy: stats.accuracy(self.average),
            error_rate: stats.error_rate(self.average),
            precision: stats.precision(self.average),
            recall: stats.recall(self.average),
            specificity: stats.specificity(self.average),
            f1: stats.f1_score(self.average),
        })
    }

    fn classification_stats(&self, operation: &'static str) -> Result<&ClassificationStats> {
        match &self.accumulator {
            Accumulator::Classification(stats) => Ok(stats),
            Accumulator::Regression(_) => Err(NetworkError::invalid_state(
                operation,
                "not a classification metric",
            )),
        }
    }

    /// Logs the derived scores for this accumulator.
    pub fn report_log(&self) {
        match &self.accumulator {
            Accumulator::Regression(stats) => {
                info!(
                    mean_absolute_error = stats.mean_absolute_error(),
                    mean_squared_error = stats.mean_squared_error(),
                    rmse = stats.rmse(),
                    r2 = ?stats.r2(),
                    "regression report"
                );
            }
            Accumulator::Classification(stats) => {
                info!(
                    accuracy = stats.accuracy(self.average),
                    precision = stats.precision(self.average),
                    recall = stats.recall(self.average),
                    specificity = stats.specificity(self.average),
                    f1 = stats.f1_score(self.average),
                    "classification report"
                );
                for &predicted in stats.features() {
                    let row: Vec<u64> = stats
                        .features()
                        .iter()
                        .map(|&actual| stats.confusion(predicted, actual))
                        .collect();
                    info!(feature = predicted, counts = ?row, "confusion row");
                }
            }
        }
    }

    /// Serializes the derived scores and history to JSON.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when serialization fails.
    pub fn export_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct MetricsExport<'a> {
            kind: MetricsKind,
            regression: Option<RegressionScores>,
            classification: Option<ClassificationScores>,
            history: &'a BTreeMap<u64, f64>,
        }

        let export = MetricsExport {
            kind: self.kind,
            regression: self.regression_scores().ok(),
            classification: self.classification_scores().ok(),
            history: self.history(),
        };
        serde_json::to_string_pretty(&export)
            .map_err(|e| NetworkError::configuration(format!("failed to serialize metrics: {e}")))
    }
}

/// Applies the classification rule to a raw predicted vector.
///
/// Single-label mode marks every entry equal to the maximum as positive;
/// multi-label mode marks every entry at or above `threshold` as positive.
fn classify(predicted: &[f64], multi_label: bool, threshold: f64) -> Vec<bool> {
    if multi_label {
        predicted.iter().map(|&v| v >= threshold).collect()
    } else {
        let max = predicted.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        predicted.iter().map(|&v| v == max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_label_ties_mark_all_maxima() {
        let positives = classify(&[0.4, 0.4, 0.1], false, 0.5);
        assert_eq!(positives, vec![true, true, false]);
    }

    #[test]
    fn test_multi_label_threshold_rule() {
        let positives = classify(&[0.4, 0.6, 0.5], true, 0.5);
        assert_eq!(positives, vec![false, true, true]);
    }

    #[test]
    fn test_variant_is_fixed_after_construction() {
        let metrics = Metrics::regression();
        assert_eq!(metrics.kind(), MetricsKind::Regression);
        assert!(metrics.accuracy().is_err());

        let metrics = Metrics::classification(false);
        assert_eq!(metrics.kind(), MetricsKind::Classification);
        assert!(metrics.rmse().is_err());
    }

    #[test]
    fn test_reference_copies_configuration_with_empty_state() {
        let mut metrics = Metrics::classification(true)
            .with_multi_label_threshold(0.3)
            .unwrap()
            .with_average(AverageKind::Micro)
            .with_history_capacity(50);
        metrics
            .report(&vec![vec![0.9, 0.1]], &vec![vec![1.0, 0.0]])
            .unwrap();
        metrics.store(1);

        let fresh = metrics.reference();
        assert_eq!(fresh.kind(), MetricsKind::Classification);
        assert!(fresh.multi_label());
        assert!((fresh.multi_label_threshold() - 0.3).abs() < f64::EPSILON);
        assert_eq!(fresh.average_kind(), AverageKind::Micro);
        assert_eq!(fresh.error_count(), 0);
        assert!(fresh.history().is_empty());
    }

    #[test]
    fn test_store_records_one_minus_accuracy() {
        let mut metrics = Metrics::classification(false);
        // One correct and one incorrect single-label prediction.
        metrics
            .report(
                &vec![vec![0.9, 0.1], vec![0.8, 0.2]],
                &vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .unwrap();
        metrics.store(1);
        let accuracy = metrics.accuracy().unwrap();
        assert!((metrics.absolute() - (1.0 - accuracy)).abs() < 1e-12);
    }

    #[test]
    fn test_store_and_reset_keeps_history() {
        let mut metrics = Metrics::regression();
        metrics.report_error(0.5).unwrap();
        metrics.store_and_reset(7);
        assert_eq!(metrics.error_count(), 0);
        assert!((metrics.absolute_at(7) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_average_r2_smoothing_across_stores() {
        let mut metrics = Metrics::regression();
        metrics
            .report(&vec![vec![1.0], vec![2.0]], &vec![vec![1.1], vec![1.9]])
            .unwrap();
        metrics.store(1);
        let first = metrics.average_r2().unwrap();
        let current = metrics.r2().unwrap().unwrap();
        assert!((first - current).abs() < 1e-12);

        metrics.store(2);
        let second = metrics.average_r2().unwrap();
        assert!((second - (0.9 * first + 0.1 * current)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_classification_report_is_rejected() {
        let mut metrics = Metrics::classification(false);
        let empty: Sequence = Vec::new();
        assert!(metrics.report(&empty, &empty).is_err());
    }

    #[test]
    fn test_scalar_reports_ignored_by_classification() {
        let mut metrics = Metrics::classification(false);
        metrics.report_error(0.5).unwrap();
        assert_eq!(metrics.error_count(), 0);
    }

    #[test]
    fn test_export_json_contains_scores() {
        let mut metrics = Metrics::regression();
        metrics.report_error(0.25).unwrap();
        metrics.store(1);
        let json = metrics.export_json().unwrap();
        assert!(json.contains("mean_absolute_error"));
        assert!(json.contains("history"));
    }
}
