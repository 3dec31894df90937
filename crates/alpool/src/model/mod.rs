//! Model contract consumed by the query strategies.
//!
//! Strategies never fit the caller's model in place: they clone it and fit the
//! clone. The traits below therefore require `Clone` (an independent copy)
//! plus `Send + Sync` so clones can be handed to worker threads.
//!
//! - [`Estimator`]: anything that can be fitted on a partially labeled set.
//! - [`ProbabilisticClassifier`]: adds class probabilities.
//! - [`ClassFrequencyEstimator`]: adds kernel class frequencies.
//!
//! Capabilities are expressed as trait bounds, so a strategy that needs
//! probabilities cannot be constructed around a model that lacks them.

mod parzen;

pub use parzen::ParzenWindowClassifier;

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::ModelError;
use crate::labels::MissingLabel;

/// A model that can be fitted on `(X, y)` where `y` may contain missing labels.
pub trait Estimator: Clone + Send + Sync {
    /// Fit on `(x, y)`, replacing any previously fitted state.
    ///
    /// Entries of `y` equal to [`Estimator::missing_label`] are unlabeled and
    /// must be ignored (or used without their label).
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError>;

    /// Sentinel this model uses for missing labels.
    fn missing_label(&self) -> MissingLabel {
        MissingLabel::default()
    }
}

/// Classifier producing a row-stochastic probability matrix.
pub trait ProbabilisticClassifier: Estimator {
    /// Known classes, in the column order of [`predict_proba`](Self::predict_proba).
    fn classes(&self) -> &[f64];

    /// Class probabilities, shape `(n_samples, n_classes)`, rows sum to 1.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError>;
}

/// Classifier exposing (kernel) class frequency estimates.
pub trait ClassFrequencyEstimator: ProbabilisticClassifier {
    /// Class frequencies, shape `(n_samples, n_classes)`, non-negative.
    fn predict_freq(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError>;
}
