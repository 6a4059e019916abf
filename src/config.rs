//! Runner configuration and builder.
//!
//! Construction-time settings for a [`NetworkRunner`](crate::runner::NetworkRunner):
//! instance name, metric selection for validation, error-history retention
//! and verbosity defaults. Settings that the orchestration contract allows
//! to change between phases (samplers, auto-validation cycle, verbosity)
//! also have runtime setters on the runner itself; this struct provides the
//! initial values.
//!
//! # Example
//!
//! ```rust
//! use net_trainer_rs::config::RunnerConfig;
//! use net_trainer_rs::metrics::MetricsKind;
//!
//! let config = RunnerConfig::builder()
//!     .name("autoencoder")
//!     .validation_metrics(MetricsKind::Classification)
//!     .multi_label(true)
//!     .auto_validation_cycle(100)
//!     .build();
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{NetworkError, Result};
use crate::metrics::MetricsKind;

/// Configuration for a network runner.
///
/// # Defaults
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `error_history_size` | 1000 | Bounded error-history retention |
/// | `validation_metrics` | Regression | Validation accumulator variant |
/// | `multi_label` | false | Single-label classification rule |
/// | `multi_label_threshold` | 0.5 | Positive threshold in multi-label mode |
/// | `auto_validation_cycle` | 0 | Iterations between automatic validation (0 = off) |
/// | `verbose_cycle` | 100 | Iterations between progress log events |
/// | `use_r2_as_last_error` | true | Regression last-error source (R² vs RMSE) |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Optional instance name, used in log events and the worker thread name.
    #[serde(default)]
    pub name: Option<String>,

    /// Capacity of the bounded error history kept by each metrics
    /// accumulator.
    #[serde(default = "default_error_history_size")]
    pub error_history_size: usize,

    /// Metric variant used for the validation accumulator. The training
    /// accumulator is always regression over the pipeline's scalar error.
    #[serde(default)]
    pub validation_metrics: MetricsKind,

    /// Classification rule: multi-label thresholding instead of
    /// single-label arg-max.
    #[serde(default)]
    pub multi_label: bool,

    /// Positive-class threshold for multi-label classification.
    #[serde(default = "default_multi_label_threshold")]
    pub multi_label_threshold: f64,

    /// Number of training iterations between automatic validation passes.
    /// Zero disables auto-validation.
    #[serde(default)]
    pub auto_validation_cycle: u64,

    /// Number of iterations between verbose progress events.
    #[serde(default = "default_verbose_cycle")]
    pub verbose_cycle: u64,

    /// Whether the regression last-error query reports R² (true) or the
    /// RMSE of the most recent sample (false).
    #[serde(default = "default_use_r2_as_last_error")]
    pub use_r2_as_last_error: bool,
}

fn default_error_history_size() -> usize {
    1000
}
fn default_multi_label_threshold() -> f64 {
    0.5
}
fn default_verbose_cycle() -> u64 {
    100
}
fn default_use_r2_as_last_error() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: None,
            error_history_size: default_error_history_size(),
            validation_metrics: MetricsKind::default(),
            multi_label: false,
            multi_label_threshold: default_multi_label_threshold(),
            auto_validation_cycle: 0,
            verbose_cycle: default_verbose_cycle(),
            use_r2_as_last_error: default_use_r2_as_last_error(),
        }
    }
}

impl RunnerConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            NetworkError::configuration(format!("failed to read config file: {e}"))
        })?;
        toml::from_str(&content)
            .map_err(|e| NetworkError::configuration(format!("failed to parse config: {e}")))
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if serialization or writing fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            NetworkError::configuration(format!("failed to serialize config: {e}"))
        })?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| NetworkError::configuration(format!("failed to write config file: {e}")))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.error_history_size == 0 {
            return Err(NetworkError::configuration(
                "error_history_size must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.multi_label_threshold) {
            return Err(NetworkError::configuration(
                "multi_label_threshold must be between 0 and 1",
            ));
        }
        if self.verbose_cycle == 0 {
            return Err(NetworkError::configuration("verbose_cycle must be > 0"));
        }
        Ok(())
    }
}

/// Builder for [`RunnerConfig`].
#[derive(Debug, Default)]
pub struct RunnerConfigBuilder {
    name: Option<String>,
    error_history_size: Option<usize>,
    validation_metrics: Option<MetricsKind>,
    multi_label: Option<bool>,
    multi_label_threshold: Option<f64>,
    auto_validation_cycle: Option<u64>,
    verbose_cycle: Option<u64>,
    use_r2_as_last_error: Option<bool>,
}

impl RunnerConfigBuilder {
    /// Sets the instance name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the error-history capacity.
    #[must_use]
    pub fn error_history_size(mut self, size: usize) -> Self {
        self.error_history_size = Some(size);
        self
    }

    /// Sets the validation metric variant.
    #[must_use]
    pub fn validation_metrics(mut self, kind: MetricsKind) -> Self {
        self.validation_metrics = Some(kind);
        self
    }

    /// Enables or disables the multi-label classification rule.
    #[must_use]
    pub fn multi_label(mut self, multi_label: bool) -> Self {
        self.multi_label = Some(multi_label);
        self
    }

    /// Sets the multi-label positive threshold.
    #[must_use]
    pub fn multi_label_threshold(mut self, threshold: f64) -> Self {
        self.multi_label_threshold = Some(threshold);
        self
    }

    /// Sets the auto-validation cycle length in iterations (0 disables).
    #[must_use]
    pub fn auto_validation_cycle(mut self, cycle: u64) -> Self {
        self.auto_validation_cycle = Some(cycle);
        self
    }

    /// Sets the verbose progress cycle in iterations.
    #[must_use]
    pub fn verbose_cycle(mut self, cycle: u64) -> Self {
        self.verbose_cycle = Some(cycle);
        self
    }

    /// Selects R² (true) or latest-sample RMSE (false) as the regression
    /// last-error source.
    #[must_use]
    pub fn use_r2_as_last_error(mut self, use_r2: bool) -> Self {
        self.use_r2_as_last_error = Some(use_r2);
        self
    }

    /// Builds the configuration, filling unset fields with defaults.
    #[must_use]
    pub fn build(self) -> RunnerConfig {
        let defaults = RunnerConfig::default();
        RunnerConfig {
            name: self.name.or(defaults.name),
            error_history_size: self
                .error_history_size
                .unwrap_or(defaults.error_history_size),
            validation_metrics: self
                .validation_metrics
                .unwrap_or(defaults.validation_metrics),
            multi_label: self.multi_label.unwrap_or(defaults.multi_label),
            multi_label_threshold: self
                .multi_label_threshold
                .unwrap_or(defaults.multi_label_threshold),
            auto_validation_cycle: self
                .auto_validation_cycle
                .unwrap_or(defaults.auto_validation_cycle),
            verbose_cycle: self.verbose_cycle.unwrap_or(defaults.verbose_cycle),
            use_r2_as_last_error: self
                .use_r2_as_last_error
                .unwrap_or(defaults.use_r2_as_last_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.error_history_size, 1000);
        assert_eq!(config.validation_metrics, MetricsKind::Regression);
        assert!(!config.multi_label);
        assert!((config.multi_label_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.auto_validation_cycle, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = RunnerConfig::builder()
            .name("mnist")
            .validation_metrics(MetricsKind::Classification)
            .multi_label(true)
            .multi_label_threshold(0.3)
            .auto_validation_cycle(50)
            .build();
        assert_eq!(config.name.as_deref(), Some("mnist"));
        assert_eq!(config.validation_metrics, MetricsKind::Classification);
        assert!(config.multi_label);
        assert!((config.multi_label_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.auto_validation_cycle, 50);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = RunnerConfig::builder().multi_label_threshold(1.5).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_history() {
        let config = RunnerConfig::builder().error_history_size(0).build();
        assert!(config.validate().is_err());
    }
}
