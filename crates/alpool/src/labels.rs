//! Missing-label handling.
//!
//! Labels are stored as `f64`. A sample is unlabeled when its label equals the
//! configured [`MissingLabel`] sentinel. The default sentinel is `NaN`, which
//! never compares equal to itself, so all comparisons go through
//! [`MissingLabel::matches`].

use ndarray::{Array1, ArrayView1};

/// Default missing-label sentinel.
pub const MISSING_LABEL: f64 = f64::NAN;

/// Sentinel marking a label as not yet acquired.
#[derive(Debug, Clone, Copy)]
pub struct MissingLabel(f64);

impl Default for MissingLabel {
    fn default() -> Self {
        Self(MISSING_LABEL)
    }
}

impl PartialEq for MissingLabel {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.0)
    }
}

impl From<f64> for MissingLabel {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl MissingLabel {
    /// Use `value` as the sentinel.
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// The raw sentinel value.
    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether the sentinel is `NaN`.
    #[inline]
    pub fn is_nan(self) -> bool {
        self.0.is_nan()
    }

    /// NaN-aware comparison of `label` against the sentinel.
    #[inline]
    pub fn matches(self, label: f64) -> bool {
        if self.0.is_nan() {
            label.is_nan()
        } else {
            label == self.0
        }
    }
}

/// Boolean mask of labeled entries.
pub fn is_labeled(y: ArrayView1<'_, f64>, missing_label: MissingLabel) -> Array1<bool> {
    y.mapv(|label| !missing_label.matches(label))
}

/// Boolean mask of unlabeled entries.
pub fn is_unlabeled(y: ArrayView1<'_, f64>, missing_label: MissingLabel) -> Array1<bool> {
    y.mapv(|label| missing_label.matches(label))
}

/// Positions of labeled entries, ascending.
pub fn labeled_indices(y: ArrayView1<'_, f64>, missing_label: MissingLabel) -> Vec<usize> {
    y.iter()
        .enumerate()
        .filter(|&(_, &label)| !missing_label.matches(label))
        .map(|(i, _)| i)
        .collect()
}

/// Positions of unlabeled entries, ascending.
pub fn unlabeled_indices(y: ArrayView1<'_, f64>, missing_label: MissingLabel) -> Vec<usize> {
    y.iter()
        .enumerate()
        .filter(|&(_, &label)| missing_label.matches(label))
        .map(|(i, _)| i)
        .collect()
}
