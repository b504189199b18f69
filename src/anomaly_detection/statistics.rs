//! Running statistics over a multiset of amounts
//!
//! One immutable value type with two construction paths: the online fold
//! used for single confirmed transactions, and the batch recompute used by
//! profile rebuilds. Both produce population mean and variance, so folding
//! a multiset one value at a time (in any order) lands on the same numbers
//! as recomputing it in one pass.

use serde::{Deserialize, Serialize};

/// Population statistics of a non-empty multiset of amounts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticsAccumulator {
    count: u64,
    mean: f64,
    variance: f64,
    min: f64,
    max: f64,
}

impl StatisticsAccumulator {
    /// Statistics of a single observation
    pub fn seed(value: f64) -> Self {
        Self {
            count: 1,
            mean: value,
            variance: 0.0,
            min: value,
            max: value,
        }
    }

    /// Rebuild an accumulator from persisted summary fields.
    ///
    /// `std_deviation` is squared back into a variance; a zero count yields `None`.
    pub fn from_parts(count: u64, mean: f64, std_deviation: f64, min: f64, max: f64) -> Option<Self> {
        if count == 0 {
            return None;
        }
        Some(
            Self {
                count,
                mean,
                variance: std_deviation * std_deviation,
                min,
                max,
            }
            .settled(),
        )
    }

    /// Fold one new value into `previous` with the online recurrence
    ///
    /// ```text
    /// mean'     = (mean·n + x) / (n + 1)
    /// variance' = (n·variance + (x - mean)(x - mean')) / (n + 1)
    /// ```
    pub fn from_fold(previous: &Self, value: f64) -> Self {
        let n = previous.count as f64;
        let mean = (previous.mean * n + value) / (n + 1.0);
        let variance = (n * previous.variance + (value - previous.mean) * (value - mean)) / (n + 1.0);

        Self {
            count: previous.count + 1,
            mean,
            variance,
            min: previous.min.min(value),
            max: previous.max.max(value),
        }
        .settled()
    }

    /// Recompute statistics over the full list of values.
    ///
    /// Returns `None` for an empty list.
    pub fn from_batch(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(
            Self {
                count: values.len() as u64,
                mean,
                variance,
                min,
                max,
            }
            .settled(),
        )
    }

    /// Strip float rounding: a constant multiset has exactly zero variance
    /// and its mean equals its value; otherwise the mean stays in `[min, max]`.
    fn settled(mut self) -> Self {
        if self.min == self.max {
            self.mean = self.min;
            self.variance = 0.0;
        } else {
            self.mean = self.mean.clamp(self.min, self.max);
            self.variance = self.variance.max(0.0);
        }
        self
    }

    /// Fold every value of `values` in iteration order
    pub fn fold_all<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut iter = values.into_iter();
        let first = Self::seed(iter.next()?);
        Some(iter.fold(first, |acc, v| Self::from_fold(&acc, v)))
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn std_deviation(&self) -> f64 {
        self.variance.sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
