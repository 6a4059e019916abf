//! Streaming regression statistics.
//!
//! Accumulates per-dimension absolute and squared error sums, keeps the
//! (prediction, actual) cache needed for the coefficient of determination,
//! and answers mean-error / RMSE / R² queries on demand.
//!
//! # R² cache lifecycle
//!
//! The cache persists across reads: querying [`RegressionStats::r2`] never
//! drains it, so repeated queries over the same accumulated window return
//! the same value. The cache is emptied only by [`RegressionStats::reset`],
//! which the orchestrator invokes at the start of every training and
//! validation pass, bounding memory to one phase.

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};

/// Streaming regression error accumulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegressionStats {
    /// Number of samples accumulated.
    count: u64,

    /// Per-dimension running sum of absolute errors.
    cumulative_absolute_error: Vec<f64>,

    /// Per-dimension running sum of squared errors.
    cumulative_squared_error: Vec<f64>,

    /// Per-sample mean absolute error, in report order.
    absolute_samples: Vec<f64>,

    /// Per-sample mean squared error, in report order.
    squared_samples: Vec<f64>,

    /// Cached predictions for R².
    predictions: Vec<Vec<f64>>,

    /// Cached actuals for R².
    actuals: Vec<Vec<f64>>,

    /// Whether `last_error` reports R² instead of latest-sample RMSE.
    use_r2_as_last_error: bool,
}

impl RegressionStats {
    /// Creates an empty accumulator.
    ///
    /// # Arguments
    ///
    /// * `use_r2_as_last_error` - selects R² (true) or the RMSE of the most
    ///   recent sample (false) as the last-error value.
    #[must_use]
    pub fn new(use_r2_as_last_error: bool) -> Self {
        Self {
            use_r2_as_last_error,
            ..Self::default()
        }
    }

    /// Creates a fresh accumulator with identical configuration and empty
    /// state.
    #[must_use]
    pub fn reference(&self) -> Self {
        Self::new(self.use_r2_as_last_error)
    }

    /// Number of samples accumulated.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.count
    }

    /// Accumulates one predicted/actual pair.
    ///
    /// The first sample fixes the output dimension; later samples must
    /// match it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on a dimension mismatch.
    pub fn update(&mut self, predicted: &[f64], actual: &[f64]) -> Result<()> {
        if predicted.len() != actual.len() {
            return Err(NetworkError::configuration(format!(
                "predicted dimension {} does not match actual dimension {}",
                predicted.len(),
                actual.len()
            )));
        }
        self.accumulate_errors(predicted, actual)?;
        self.predictions.push(predicted.to_vec());
        self.actuals.push(actual.to_vec());
        Ok(())
    }

    /// Accumulates a single scalar error value.
    ///
    /// Scalar reports update the error sums but not the R² cache, since no
    /// predicted/actual pair is available.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when scalar reports are mixed into an
    /// accumulator that already holds multi-dimensional samples.
    pub fn update_scalar(&mut self, error: f64) -> Result<()> {
        let residual = [error];
        let zero = [0.0];
        self.accumulate_errors(&residual, &zero)
    }

    fn accumulate_errors(&mut self, predicted: &[f64], actual: &[f64]) -> Result<()> {
        if self.cumulative_absolute_error.is_empty() {
            self.cumulative_absolute_error = vec![0.0; predicted.len()];
            self.cumulative_squared_error = vec![0.0; predicted.len()];
        } else if self.cumulative_absolute_error.len() != predicted.len() {
            return Err(NetworkError::configuration(format!(
                "sample dimension {} does not match accumulated dimension {}",
                predicted.len(),
                self.cumulative_absolute_error.len()
            )));
        }

        let mut abs_sum = 0.0;
        let mut sq_sum = 0.0;
        for (dim, (p, a)) in predicted.iter().zip(actual.iter()).enumerate() {
            let residual = a - p;
            let abs = residual.abs();
            let sq = residual * residual;
            self.cumulative_absolute_error[dim] += abs;
            self.cumulative_squared_error[dim] += sq;
            abs_sum += abs;
            sq_sum += sq;
        }
        let dims = predicted.len() as f64;
        self.absolute_samples.push(abs_sum / dims);
        self.squared_samples.push(sq_sum / dims);
        self.count += 1;
        Ok(())
    }

    /// Mean absolute error over all accumulated samples, averaged across
    /// dimensions. Returns 0 before the first sample.
    #[must_use]
    pub fn mean_absolute_error(&self) -> f64 {
        self.mean_of_cumulative(&self.cumulative_absolute_error)
    }

    /// Mean squared error over all accumulated samples, averaged across
    /// dimensions. Returns 0 before the first sample.
    #[must_use]
    pub fn mean_squared_error(&self) -> f64 {
        self.mean_of_cumulative(&self.cumulative_squared_error)
    }

    /// Root-mean-square error over all accumulated samples.
    #[must_use]
    pub fn rmse(&self) -> f64 {
        self.mean_squared_error().sqrt()
    }

    /// Mean absolute error over the `last_n` most recent samples.
    #[must_use]
    pub fn mean_absolute_error_last(&self, last_n: usize) -> f64 {
        mean_of_tail(&self.absolute_samples, last_n)
    }

    /// Root-mean-square error over the `last_n` most recent samples.
    #[must_use]
    pub fn rmse_last(&self, last_n: usize) -> f64 {
        mean_of_tail(&self.squared_samples, last_n).sqrt()
    }

    fn mean_of_cumulative(&self, cumulative: &[f64]) -> f64 {
        if self.count == 0 || cumulative.is_empty() {
            return 0.0;
        }
        let per_dim_mean: f64 =
            cumulative.iter().map(|sum| sum / self.count as f64).sum::<f64>();
        per_dim_mean / cumulative.len() as f64
    }

    /// Per-dimension R² = 1 − SS_res / SS_tot over the cached pairs.
    ///
    /// A dimension whose actual values have zero total variance
    /// (SS_tot == 0) yields `None` for that dimension. Returns an empty
    /// vector when the cache is empty.
    #[must_use]
    pub fn r2_values(&self) -> Vec<Option<f64>> {
        if self.actuals.is_empty() {
            return Vec::new();
        }
        let dims = self.actuals[0].len();
        let n = self.actuals.len() as f64;

        let mut mean_actual = vec![0.0; dims];
        for actual in &self.actuals {
            for (dim, a) in actual.iter().enumerate() {
                mean_actual[dim] += a;
            }
        }
        for mean in &mut mean_actual {
            *mean /= n;
        }

        let mut ss_res = vec![0.0; dims];
        let mut ss_tot = vec![0.0; dims];
        for (actual, prediction) in self.actuals.iter().zip(self.predictions.iter()) {
            for dim in 0..dims {
                let res = actual[dim] - prediction[dim];
                ss_res[dim] += res * res;
                let tot = actual[dim] - mean_actual[dim];
                ss_tot[dim] += tot * tot;
            }
        }

        ss_res
            .iter()
            .zip(ss_tot.iter())
            .map(|(&res, &tot)| {
                if tot == 0.0 {
                    None
                } else {
                    Some(1.0 - res / tot)
                }
            })
            .collect()
    }

    /// Mean R² over the dimensions where it is defined, or `None` when the
    /// cache is empty or no dimension has nonzero variance.
    #[must_use]
    pub fn r2(&self) -> Option<f64> {
        let values = self.r2_values();
        let defined: Vec<f64> = values.into_iter().flatten().collect();
        if defined.is_empty() {
            None
        } else {
            Some(defined.iter().sum::<f64>() / defined.len() as f64)
        }
    }

    /// Returns the configured last-error value: R² when configured so
    /// (0 when undefined), otherwise the RMSE of the most recent sample.
    #[must_use]
    pub fn last_error(&self) -> f64 {
        if self.use_r2_as_last_error {
            self.r2().unwrap_or(0.0)
        } else {
            self.squared_samples
                .last()
                .map_or(0.0, |sq| sq.sqrt())
        }
    }

    /// Clears all accumulated state, including the R² cache.
    pub fn reset(&mut self) {
        self.count = 0;
        self.cumulative_absolute_error.clear();
        self.cumulative_squared_error.clear();
        self.absolute_samples.clear();
        self.squared_samples.clear();
        self.predictions.clear();
        self.actuals.clear();
    }
}

fn mean_of_tail(samples: &[f64], last_n: usize) -> f64 {
    let tail = &samples[samples.len().saturating_sub(last_n)..];
    if tail.is_empty() {
        0.0
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_stream_mae_and_rmse() {
        let mut stats = RegressionStats::new(false);
        for error in [0.1, 0.2, 0.3] {
            stats.update_scalar(error).unwrap();
        }
        assert_eq!(stats.error_count(), 3);
        assert!((stats.mean_absolute_error() - 0.2).abs() < 1e-12);
        // Mean of squared errors 0.01, 0.04, 0.09 is 0.14 / 3.
        let expected_rmse = (0.14f64 / 3.0).sqrt();
        assert!((stats.rmse() - expected_rmse).abs() < 1e-12);
    }

    #[test]
    fn test_last_error_rmse_of_latest_sample() {
        let mut stats = RegressionStats::new(false);
        stats.update_scalar(0.5).unwrap();
        stats.update_scalar(0.3).unwrap();
        assert!((stats.last_error() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_prediction_r2_is_one() {
        let mut stats = RegressionStats::new(true);
        for sample in [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]] {
            stats.update(&sample, &sample).unwrap();
        }
        let values = stats.r2_values();
        assert_eq!(values.len(), 2);
        for value in values {
            assert!((value.unwrap() - 1.0).abs() < 1e-12);
        }
        assert!((stats.last_error() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_variance_dimension_is_undefined() {
        let mut stats = RegressionStats::new(true);
        // Second dimension is constant: SS_tot == 0 there.
        stats.update(&[1.0, 7.0], &[1.0, 7.0]).unwrap();
        stats.update(&[2.0, 7.0], &[2.0, 7.0]).unwrap();
        let values = stats.r2_values();
        assert!(values[0].is_some());
        assert!(values[1].is_none());
        // Mean R² is still defined from the varying dimension.
        assert!((stats.r2().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_constant_actuals_yield_none() {
        let mut stats = RegressionStats::new(true);
        stats.update(&[3.0], &[3.0]).unwrap();
        stats.update(&[3.0], &[3.0]).unwrap();
        assert!(stats.r2().is_none());
        // last_error falls back to 0 rather than panicking.
        assert!((stats.last_error() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_r2_cache_persists_across_reads() {
        let mut stats = RegressionStats::new(true);
        stats.update(&[1.0], &[2.0]).unwrap();
        stats.update(&[4.0], &[3.0]).unwrap();
        let first = stats.r2();
        let second = stats.r2();
        assert_eq!(first, second);
        stats.reset();
        assert!(stats.r2().is_none());
        assert_eq!(stats.error_count(), 0);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let mut stats = RegressionStats::new(true);
        stats.update(&[1.0, 2.0], &[1.0, 2.0]).unwrap();
        assert!(stats.update(&[1.0], &[1.0]).is_err());
        assert!(stats.update(&[1.0, 2.0, 3.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_last_n_windows() {
        let mut stats = RegressionStats::new(false);
        for error in [1.0, 1.0, 0.2, 0.4] {
            stats.update_scalar(error).unwrap();
        }
        assert!((stats.mean_absolute_error_last(2) - 0.3).abs() < 1e-12);
        let expected = ((0.04f64 + 0.16) / 2.0).sqrt();
        assert!((stats.rmse_last(2) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_reference_preserves_configuration() {
        let mut stats = RegressionStats::new(false);
        stats.update_scalar(0.5).unwrap();
        let fresh = stats.reference();
        assert_eq!(fresh.error_count(), 0);
        assert!(!fresh.use_r2_as_last_error);
    }
}
