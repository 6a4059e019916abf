//! Streaming classification statistics.
//!
//! Maintains per-feature confusion bookkeeping together with running
//! TP/FP/TN/FN totals, and derives accuracy, error rate, precision, recall,
//! specificity and F1 under macro or micro averaging.
//!
//! The caller applies the classification rule (arg-max or thresholding)
//! before updating; this accumulator only counts already-binarized
//! predictions against 0/1 actuals.
//!
//! # Averaging semantics
//!
//! - **Macro**: unweighted mean over features; a feature whose denominator
//!   is zero is skipped and does not count toward the averaging divisor.
//! - **Micro**: one ratio over the summed totals. Zero denominators are
//!   deliberately not guarded and produce NaN; callers that need a defined
//!   value must check [`ClassificationStats::total_count`] first. The F1
//!   micro score is the one exception, returning 0 when precision and
//!   recall are both unavailable.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Averaging mode for derived classification scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AverageKind {
    /// Unweighted mean of per-feature scores.
    #[default]
    Macro,

    /// Single ratio over totals pooled across features.
    Micro,
}

/// Streaming confusion and contingency accumulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationStats {
    /// Feature indices seen so far.
    features: BTreeSet<usize>,

    /// Per-feature true positives.
    tp: HashMap<usize, u64>,

    /// Per-feature false positives.
    fp: HashMap<usize, u64>,

    /// Per-feature true negatives.
    tn: HashMap<usize, u64>,

    /// Per-feature false negatives.
    fn_: HashMap<usize, u64>,

    /// Running totals across all features.
    tp_total: u64,
    fp_total: u64,
    tn_total: u64,
    fn_total: u64,

    /// Sparse confusion counts: predicted feature → actual feature → count.
    confusion: HashMap<usize, HashMap<usize, u64>>,
}

impl ClassificationStats {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates one binarized predicted/actual pair.
    ///
    /// For every ordered feature pair `(p, a)`: when `actual[p] == 1` and
    /// `predicted[a] == 1` the confusion cell `(p, a)` is incremented. On
    /// the diagonal (`p == a`) the pair is additionally classified into
    /// TP/TN/FN/FP for that feature, updating both the per-feature count
    /// and the running total. Actual values other than exactly 0 or 1 skip
    /// the diagonal contingency update.
    pub fn update(&mut self, predicted: &[bool], actual: &[f64]) {
        let dims = predicted.len().min(actual.len());
        for p in 0..dims {
            self.features.insert(p);
            let actual_at_p = actual[p];
            for a in 0..dims {
                if actual_at_p == 1.0 && predicted[a] {
                    *self
                        .confusion
                        .entry(p)
                        .or_default()
                        .entry(a)
                        .or_insert(0) += 1;
                }
                if p == a {
                    let predicted_at = predicted[p];
                    if actual_at_p == 1.0 {
                        if predicted_at {
                            *self.tp.entry(p).or_insert(0) += 1;
                            self.tp_total += 1;
                        } else {
                            *self.fn_.entry(p).or_insert(0) += 1;
                            self.fn_total += 1;
                        }
                    } else if actual_at_p == 0.0 {
                        if predicted_at {
                            *self.fp.entry(p).or_insert(0) += 1;
                            self.fp_total += 1;
                        } else {
                            *self.tn.entry(p).or_insert(0) += 1;
                            self.tn_total += 1;
                        }
                    }
                }
            }
        }
    }

    /// Clears all accumulated counts.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feature indices seen so far.
    #[must_use]
    pub fn features(&self) -> &BTreeSet<usize> {
        &self.features
    }

    /// True-positive count for `feature`.
    #[must_use]
    pub fn tp(&self, feature: usize) -> u64 {
        self.tp.get(&feature).copied().unwrap_or(0)
    }

    /// False-positive count for `feature`.
    #[must_use]
    pub fn fp(&self, feature: usize) -> u64 {
        self.fp.get(&feature).copied().unwrap_or(0)
    }

    /// True-negative count for `feature`.
    #[must_use]
    pub fn tn(&self, feature: usize) -> u64 {
        self.tn.get(&feature).copied().unwrap_or(0)
    }

    /// False-negative count for `feature`.
    #[must_use]
    pub fn fn_(&self, feature: usize) -> u64 {
        self.fn_.get(&feature).copied().unwrap_or(0)
    }

    /// Total true positives across features.
    #[must_use]
    pub fn tp_total(&self) -> u64 {
        self.tp_total
    }

    /// Total false positives across features.
    #[must_use]
    pub fn fp_total(&self) -> u64 {
        self.fp_total
    }

    /// Total true negatives across features.
    #[must_use]
    pub fn tn_total(&self) -> u64 {
        self.tn_total
    }

    /// Total false negatives across features.
    #[must_use]
    pub fn fn_total(&self) -> u64 {
        self.fn_total
    }

    /// Sum of all four contingency totals.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.tp_total + self.fp_total + self.tn_total + self.fn_total
    }

    /// Confusion count for a predicted/actual feature pair; absent cells
    /// read as zero.
    #[must_use]
    pub fn confusion(&self, predicted: usize, actual: usize) -> u64 {
        self.confusion
            .get(&predicted)
            .and_then(|row| row.get(&actual))
            .copied()
            .unwrap_or(0)
    }

    /// The sparse confusion mapping: predicted feature → actual feature →
    /// count.
    #[must_use]
    pub fn confusion_matrix(&self) -> &HashMap<usize, HashMap<usize, u64>> {
        &self.confusion
    }

    /// Accuracy `(TP + TN) / (TP + FP + TN + FN)` under `kind` averaging.
    #[must_use]
    pub fn accuracy(&self, kind: AverageKind) -> f64 {
        match kind {
            AverageKind::Macro => self.macro_average(|tp, fp, tn, fn_| {
                let denominator = tp + fp + tn + fn_;
                (denominator > 0.0).then(|| (tp + tn) / denominator)
            }),
            AverageKind::Micro => {
                let tp = self.tp_total as f64;
                let fp = self.fp_total as f64;
                let tn = self.tn_total as f64;
                let fn_ = self.fn_total as f64;
                (tp + tn) / (tp + fp + tn + fn_)
            }
        }
    }

    /// Error rate `(FP + FN) / (TP + FP + TN + FN)` under `kind` averaging.
    #[must_use]
    pub fn error_rate(&self, kind: AverageKind) -> f64 {
        match kind {
            AverageKind::Macro => self.macro_average(|tp, fp, tn, fn_| {
                let denominator = tp + fp + tn + fn_;
                (denominator > 0.0).then(|| (fp + fn_) / denominator)
            }),
            AverageKind::Micro => {
                let tp = self.tp_total as f64;
                let fp = self.fp_total as f64;
                let tn = self.tn_total as f64;
                let fn_ = self.fn_total as f64;
                (fp + fn_) / (tp + fp + tn + fn_)
            }
        }
    }

    /// Precision `TP / (TP + FP)` under `kind` averaging.
    #[must_use]
    pub fn precision(&self, kind: AverageKind) -> f64 {
        match kind {
            AverageKind::Macro => self.macro_average(|tp, fp, _, _| {
                (tp + fp > 0.0).then(|| tp / (tp + fp))
            }),
            AverageKind::Micro => {
                self.tp_total as f64 / (self.tp_total + self.fp_total) as f64
            }
        }
    }

    /// Recall `TP / (TP + FN)` under `kind` averaging.
    #[must_use]
    pub fn recall(&self, kind: AverageKind) -> f64 {
        match kind {
            AverageKind::Macro => self.macro_average(|tp, _, _, fn_| {
                (tp + fn_ > 0.0).then(|| tp / (tp + fn_))
            }),
            AverageKind::Micro => {
                self.tp_total as f64 / (self.tp_total + self.fn_total) as f64
            }
        }
    }

    /// Specificity `TN / (TN + FP)` under `kind` averaging.
    #[must_use]
    pub fn specificity(&self, kind: AverageKind) -> f64 {
        match kind {
            AverageKind::Macro => self.macro_average(|_, fp, tn, _| {
                (tn + fp > 0.0).then(|| tn / (tn + fp))
            }),
            AverageKind::Micro => {
                self.tn_total as f64 / (self.tn_total + self.fp_total) as f64
            }
        }
    }

    /// F1 score `2·P·R / (P + R)` under `kind` averaging.
    ///
    /// Macro averaging skips features whose precision or recall is
    /// undefined. Micro averaging returns 0 when `P + R` is zero or
    /// undefined.
    #[must_use]
    pub fn f1_score(&self, kind: AverageKind) -> f64 {
        match kind {
            AverageKind::Macro => self.macro_average(|tp, fp, _, fn_| {
                let precision = tp / (tp + fp);
                let recall = tp / (tp + fn_);
                // NaN precision or recall fails the comparison and skips
                // the feature.
                ((precision + recall) > 0.0)
                    .then(|| 2.0 * precision * recall / (precision + recall))
            }),
            AverageKind::Micro => {
                let tp = self.tp_total as f64;
                let precision = tp / (self.tp_total + self.fp_total) as f64;
                let recall = tp / (self.tp_total + self.fn_total) as f64;
                if (precision + recall) > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                }
            }
        }
    }

    fn macro_average<F>(&self, score: F) -> f64
    where
        F: Fn(f64, f64, f64, f64) -> Option<f64>,
    {
        let mut sum = 0.0;
        let mut count = 0usize;
        for &feature in &self.features {
            let tp = self.tp(feature) as f64;
            let fp = self.fp(feature) as f64;
            let tn = self.tn(feature) as f64;
            let fn_ = self.fn_(feature) as f64;
            if let Some(value) = score(tp, fp, tn, fn_) {
                sum += value;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }
}
