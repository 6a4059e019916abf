//! Bounded error history and trend queries.
//!
//! An ordered map from training iteration to scalar error, bounded to a
//! configured capacity. Eviction is index arithmetic: storing iteration `i`
//! first removes the entry at key `i - capacity`. This is a sliding window
//! only under monotonically increasing, contiguous iteration keys; gapped
//! key sequences leave stale entries behind (covered by an explicit test).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of history entries retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Smoothing carried over from the running average in trend queries.
const TREND_CARRY: f64 = 0.9;

/// Weight of each newly visited sample in trend queries.
const TREND_INNOVATION: f64 = 0.1;

/// Bounded iteration-indexed error history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHistory {
    /// Recorded errors keyed by iteration.
    entries: BTreeMap<u64, f64>,

    /// Retention capacity.
    capacity: usize,
}

impl ErrorHistory {
    /// Creates an empty history with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
        }
    }

    /// Returns the retention capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records `error` at `iteration`, evicting the entry at
    /// `iteration - capacity` first.
    pub fn store(&mut self, iteration: u64, error: f64) {
        if let Some(evict) = iteration.checked_sub(self.capacity as u64) {
            self.entries.remove(&evict);
        }
        self.entries.insert(iteration, error);
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns whether an entry exists for `iteration`.
    #[must_use]
    pub fn contains(&self, iteration: u64) -> bool {
        self.entries.contains_key(&iteration)
    }

    /// Returns the most recent error, or 0 if the history is empty.
    #[must_use]
    pub fn absolute(&self) -> f64 {
        self.entries.values().next_back().copied().unwrap_or(0.0)
    }

    /// Returns the error recorded at `iteration`, or 0 if absent.
    #[must_use]
    pub fn absolute_at(&self, iteration: u64) -> f64 {
        self.entries.get(&iteration).copied().unwrap_or(0.0)
    }

    /// Returns the mean of the `last_n` most recent entries (all entries if
    /// fewer are retained), or 0 for an empty history.
    #[must_use]
    pub fn average(&self, last_n: usize) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for error in self.entries.values().rev().take(last_n) {
            sum += error;
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Returns the minimum over the `last_n` most recent entries, or 0 for
    /// an empty history.
    #[must_use]
    pub fn min(&self, last_n: usize) -> f64 {
        self.entries
            .values()
            .rev()
            .take(last_n)
            .copied()
            .fold(None, |acc: Option<f64>, e| {
                Some(acc.map_or(e, |m| m.min(e)))
            })
            .unwrap_or(0.0)
    }

    /// Returns the maximum over the `last_n` most recent entries, or 0 for
    /// an empty history.
    #[must_use]
    pub fn max(&self, last_n: usize) -> f64 {
        self.entries
            .values()
            .rev()
            .take(last_n)
            .copied()
            .fold(None, |acc: Option<f64>, e| {
                Some(acc.map_or(e, |m| m.max(e)))
            })
            .unwrap_or(0.0)
    }

    /// Returns an exponentially smoothed trend over the `last_n` most recent
    /// entries.
    ///
    /// Walks backward from the newest entry: the first entry seeds the
    /// running value, every older entry folds in as
    /// `0.9 * running + 0.1 * sample`, and the walk stops once `last_n`
    /// entries have been visited. The result maps each visited iteration to
    /// the running value at that point. This is exponential smoothing
    /// bounded by a sample count, not an arithmetic windowed mean.
    #[must_use]
    pub fn moving_average(&self, last_n: usize) -> BTreeMap<u64, f64> {
        let mut trend = BTreeMap::new();
        let mut running = 0.0;
        for (visited, (&iteration, &error)) in self.entries.iter().rev().take(last_n).enumerate() {
            running = if visited == 0 {
                error
            } else {
                TREND_CARRY * running + TREND_INNOVATION * error
            };
            trend.insert(iteration, running);
        }
        trend
    }

    /// Returns the retained entries keyed by iteration.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<u64, f64> {
        &self.entries
    }
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
