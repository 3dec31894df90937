//! Parzen window classifier.
//!
//! A kernel density classifier: the frequency of class `c` at `x` is the sum
//! of RBF kernel values `exp(-gamma * ||x - x_l||^2)` over labeled samples
//! `x_l` of class `c`. Probabilities are frequencies plus a class prior,
//! normalized per row.
//!
//! # Example
//!
//! ```
//! use alpool::model::{Estimator, ParzenWindowClassifier, ProbabilisticClassifier};
//! use ndarray::array;
//!
//! let mut clf = ParzenWindowClassifier::builder()
//!     .classes(vec![0.0, 1.0])
//!     .build()
//!     .unwrap();
//! let x = array![[0.0], [1.0], [5.0]];
//! let y = array![0.0, 1.0, f64::NAN];
//! clf.fit(x.view(), y.view()).unwrap();
//! let proba = clf.predict_proba(array![[0.1]].view()).unwrap();
//! assert!(proba[[0, 0]] > proba[[0, 1]]);
//! ```

use bon::Builder;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::{ClassFrequencyEstimator, Estimator, ProbabilisticClassifier};
use crate::error::ModelError;
use crate::labels::MissingLabel;
use crate::utils::squared_euclidean;
use crate::validation::class_index;

// =============================================================================
// ParzenWindowClassifier
// =============================================================================

/// RBF-kernel Parzen window classifier.
#[derive(Debug, Clone, Builder)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct ParzenWindowClassifier {
    /// Class labels, in output column order.
    pub classes: Vec<f64>,

    /// Missing-label sentinel. Default: `NaN`.
    #[builder(default)]
    pub missing_label: MissingLabel,

    /// Kernel bandwidth. `None` uses `1 / n_features` at fit time.
    pub gamma: Option<f64>,

    /// Pseudo-count added to every class frequency. Default: 0.
    #[builder(default = 0.0)]
    pub class_prior: f64,

    #[builder(skip)]
    fitted: Option<FittedParzen>,
}

#[derive(Debug, Clone)]
struct FittedParzen {
    x: Array2<f64>,
    class_idx: Vec<usize>,
    gamma: f64,
}

impl<S: parzen_window_classifier_builder::IsComplete> ParzenWindowClassifierBuilder<S> {
    /// Build and validate the classifier.
    ///
    /// # Errors
    ///
    /// [`ModelError::InvalidParameter`] if the classes are empty or repeated,
    /// contain the missing label, `gamma <= 0`, or `class_prior < 0`.
    pub fn build(self) -> Result<ParzenWindowClassifier, ModelError> {
        let clf = self.__build_internal();
        clf.validate()?;
        Ok(clf)
    }
}

impl ParzenWindowClassifier {
    fn validate(&self) -> Result<(), ModelError> {
        crate::validation::check_classes(&self.classes, self.missing_label).map_err(|e| {
            ModelError::InvalidParameter {
                name: "classes",
                reason: e.to_string(),
            }
        })?;
        if let Some(gamma) = self.gamma {
            if !(gamma > 0.0 && gamma.is_finite()) {
                return Err(ModelError::InvalidParameter {
                    name: "gamma",
                    reason: format!("must be positive and finite, got {gamma}"),
                });
            }
        }
        if !(self.class_prior >= 0.0 && self.class_prior.is_finite()) {
            return Err(ModelError::InvalidParameter {
                name: "class_prior",
                reason: format!("must be >= 0, got {}", self.class_prior),
            });
        }
        Ok(())
    }

    /// Whether [`Estimator::fit`] has been called.
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fitted(&self) -> Result<&FittedParzen, ModelError> {
        self.fitted.as_ref().ok_or(ModelError::NotFitted)
    }
}

impl Estimator for ParzenWindowClassifier {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        self.validate()?;
        if x.nrows() != y.len() {
            return Err(ModelError::LengthMismatch {
                n_samples: x.nrows(),
                n_labels: y.len(),
            });
        }

        let mut rows = Vec::new();
        let mut class_idx = Vec::new();
        for (i, &label) in y.iter().enumerate() {
            if self.missing_label.matches(label) {
                continue;
            }
            let c = class_index(&self.classes, label).ok_or_else(|| ModelError::UnknownLabel {
                label,
                classes: self.classes.clone(),
            })?;
            rows.push(i);
            class_idx.push(c);
        }

        let gamma = self
            .gamma
            .unwrap_or_else(|| 1.0 / x.ncols().max(1) as f64);
        self.fitted = Some(FittedParzen {
            x: x.select(Axis(0), &rows),
            class_idx,
            gamma,
        });
        Ok(())
    }

    fn missing_label(&self) -> MissingLabel {
        self.missing_label
    }
}

impl ClassFrequencyEstimator for ParzenWindowClassifier {
    fn predict_freq(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        let fitted = self.fitted()?;
        if fitted.x.nrows() > 0 && x.ncols() != fitted.x.ncols() {
            return Err(ModelError::FeatureMismatch {
                expected: fitted.x.ncols(),
                got: x.ncols(),
            });
        }

        let mut freq = Array2::zeros((x.nrows(), self.classes.len()));
        for (mut out, sample) in freq.rows_mut().into_iter().zip(x.rows()) {
            for (train, &c) in fitted.x.rows().into_iter().zip(&fitted.class_idx) {
                out[c] += (-fitted.gamma * squared_euclidean(sample, train)).exp();
            }
        }
        Ok(freq)
    }
}

impl ProbabilisticClassifier for ParzenWindowClassifier {
    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        let mut proba = self.predict_freq(x)?;
        proba += self.class_prior;
        let n_classes = self.classes.len() as f64;
        for mut row in proba.rows_mut() {
            let total: f64 = row.sum();
            if total > 0.0 {
                row /= total;
            } else {
                row.fill(1.0 / n_classes);
            }
        }
        Ok(proba)
    }
}
