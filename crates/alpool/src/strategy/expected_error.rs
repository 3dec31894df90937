//! Expected Error Reduction.
//!
//! For every candidate `x_i` and every class `y_h` the classifier is refitted
//! on the training set extended by `(x_i, y_h)`, and the risk of the refitted
//! model is measured. The expected error of `x_i` is the risk averaged over
//! `y_h` under the current model's prediction `P(y_h | x_i)`; the utility is
//! its negation.
//!
//! Risk variants ([`ErrorMethod`]):
//!
//! - `emr`: expected misclassification risk over the candidates,
//!   `sum_n sum_{a,b} P[n,a] * P[n,b] * C[a,b]`.
//! - `csl`: cost of the refitted model on the labeled samples,
//!   `sum_l sum_j P(x_l)[j] * C[y_l, j]` (zero when nothing is labeled).
//! - `log_loss`: entropy of the refitted predictions over the candidates.
//!
//! Each call performs `n_candidates * n_classes` refits, which dominates the
//! cost of the strategy.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};

use super::{QueryRequest, QueryResult, QueryStrategy, select_batch};
use crate::candidates::resolve_candidates;
use crate::error::{QueryError, Result};
use crate::labels::{MissingLabel, labeled_indices};
use crate::model::ProbabilisticClassifier;
use crate::utils::seeded_rng;
use crate::validation::{
    check_classes, check_cost_matrix, check_labels_in_classes, class_index, zero_one_cost_matrix,
};

// =============================================================================
// ErrorMethod
// =============================================================================

/// Risk measure used by [`ExpectedErrorReduction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMethod {
    /// Expected misclassification risk.
    #[default]
    Emr,
    /// Cost-sensitive loss on the labeled samples.
    Csl,
    /// Log loss (entropy) of the predictions.
    LogLoss,
}

impl ErrorMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorMethod::Emr => "emr",
            ErrorMethod::Csl => "csl",
            ErrorMethod::LogLoss => "log_loss",
        }
    }
}

impl fmt::Display for ErrorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorMethod {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "emr" => Ok(ErrorMethod::Emr),
            "csl" => Ok(ErrorMethod::Csl),
            "log_loss" => Ok(ErrorMethod::LogLoss),
            other => Err(QueryError::invalid_value(
                "method",
                format!("must be one of [\"emr\", \"csl\", \"log_loss\"], got {other:?}"),
            )),
        }
    }
}

// =============================================================================
// ExpectedErrorReduction
// =============================================================================

/// Expected Error Reduction query strategy.
///
/// # Example
///
/// ```
/// use alpool::model::ParzenWindowClassifier;
/// use alpool::strategy::{ErrorMethod, ExpectedErrorReduction, QueryRequest, QueryStrategy};
/// use ndarray::array;
///
/// let clf = ParzenWindowClassifier::builder().classes(vec![0.0, 1.0]).build().unwrap();
/// let eer = ExpectedErrorReduction::new(clf, vec![0.0, 1.0]).with_method(ErrorMethod::LogLoss);
///
/// let x = array![[0.0], [1.0], [2.0], [3.0]];
/// let y = array![0.0, f64::NAN, f64::NAN, 1.0];
/// let result = eer.query(&QueryRequest::new(x.view(), y.view())).unwrap();
/// assert!(result.indices[0] == 1 || result.indices[0] == 2);
/// ```
#[derive(Debug, Clone)]
pub struct ExpectedErrorReduction<C> {
    /// Model refitted under hypothetical labels. Never fitted in place.
    pub clf: C,
    /// Classes; must equal `clf.classes()`.
    pub classes: Vec<f64>,
    /// Risk measure. Default: [`ErrorMethod::Emr`].
    pub method: ErrorMethod,
    /// Cost matrix `C[true, predicted]`. `None` means 0/1 loss.
    pub cost_matrix: Option<Array2<f64>>,
    /// Missing-label sentinel; must equal the model's.
    pub missing_label: MissingLabel,
    /// Seed for tie-breaking.
    pub seed: u64,
}

impl<C: ProbabilisticClassifier> ExpectedErrorReduction<C> {
    pub fn new(clf: C, classes: Vec<f64>) -> Self {
        let missing_label = clf.missing_label();
        Self {
            clf,
            classes,
            method: ErrorMethod::default(),
            cost_matrix: None,
            missing_label,
            seed: 0,
        }
    }

    pub fn with_method(mut self, method: ErrorMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_cost_matrix(mut self, cost_matrix: Array2<f64>) -> Self {
        self.cost_matrix = Some(cost_matrix);
        self
    }

    pub fn with_missing_label(mut self, missing_label: MissingLabel) -> Self {
        self.missing_label = missing_label;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the configuration against the wrapped model.
    ///
    /// # Errors
    ///
    /// Value errors for invalid classes, classes or missing label differing
    /// from the model's, or a malformed cost matrix.
    pub fn validate(&self) -> Result<()> {
        check_classes(&self.classes, self.missing_label)?;
        if self.clf.classes() != self.classes.as_slice() {
            return Err(QueryError::ClassMismatch {
                given: self.classes.clone(),
                model: self.clf.classes().to_vec(),
            });
        }
        if self.clf.missing_label() != self.missing_label {
            return Err(QueryError::invalid_value(
                "missing_label",
                format!(
                    "{} differs from the model's missing label {}",
                    self.missing_label.value(),
                    self.clf.missing_label().value()
                ),
            ));
        }
        if let Some(cost_matrix) = &self.cost_matrix {
            check_cost_matrix(cost_matrix, self.classes.len())?;
        }
        Ok(())
    }

    fn resolved_cost_matrix(&self) -> Array2<f64> {
        self.cost_matrix
            .clone()
            .unwrap_or_else(|| zero_one_cost_matrix(self.classes.len()))
    }
}

impl<C: ProbabilisticClassifier> QueryStrategy for ExpectedErrorReduction<C> {
    fn query(&self, request: &QueryRequest<'_>) -> Result<QueryResult> {
        self.validate()?;
        request.validate(self.missing_label)?;
        check_labels_in_classes(request.y, &self.classes, self.missing_label)?;

        let resolved = resolve_candidates(request.x, request.y, &request.candidates, self.missing_label)?;
        tracing::debug!(
            method = %self.method,
            n_candidates = resolved.n_candidates(),
            n_refits = resolved.n_candidates() * self.classes.len(),
            "expected error reduction"
        );

        let cost_matrix = self.resolved_cost_matrix();
        let utilities = expected_error_reduction(
            &self.clf,
            resolved.features.view(),
            request.x,
            request.y,
            &cost_matrix,
            self.method,
        )?;

        let utilities = resolved.scatter(utilities.view(), request.x.nrows());
        let mut rng = seeded_rng(self.seed);
        select_batch(utilities, request.batch_size, request.return_utilities, &mut rng)
    }

    fn missing_label(&self) -> MissingLabel {
        self.missing_label
    }
}

// =============================================================================
// Utilities
// =============================================================================

/// Per-candidate utility (negative expected error).
///
/// `clf` is cloned; the caller's model is left untouched. The classes are
/// taken from `clf.classes()` and `cost_matrix` must match them.
///
/// # Errors
///
/// Value errors for a malformed cost matrix, labels outside the classes, or
/// candidates whose width differs from `x`. Model failures are forwarded.
pub fn expected_error_reduction<C: ProbabilisticClassifier>(
    clf: &C,
    candidates: ArrayView2<'_, f64>,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    cost_matrix: &Array2<f64>,
    method: ErrorMethod,
) -> Result<Array1<f64>> {
    if x.nrows() > 0 && candidates.nrows() > 0 && x.ncols() != candidates.ncols() {
        return Err(QueryError::FeatureMismatch {
            x_features: x.ncols(),
            candidate_features: candidates.ncols(),
        });
    }
    let classes = clf.classes().to_vec();
    check_cost_matrix(cost_matrix, classes.len())?;
    let missing_label = clf.missing_label();

    let mut model = clf.clone();
    model.fit(x, y)?;
    let proba = model.predict_proba(candidates)?;

    // Labeled subset used by `csl`.
    let labeled = labeled_indices(y, missing_label);
    let x_labeled = x.select(Axis(0), &labeled);
    let mut y_labeled_idx = Vec::with_capacity(labeled.len());
    for &i in &labeled {
        let c = class_index(&classes, y[i]).ok_or_else(|| {
            QueryError::invalid_value(
                "y",
                format!("label {} is not one of the classes {classes:?}", y[i]),
            )
        })?;
        y_labeled_idx.push(c);
    }

    // Training set with one extra slot for the hypothetical sample.
    let n = x.nrows();
    let mut x_ext = Array2::<f64>::zeros((n + 1, candidates.ncols()));
    x_ext.slice_mut(s![..n, ..]).assign(&x);
    let mut y_ext = Array1::<f64>::zeros(n + 1);
    y_ext.slice_mut(s![..n]).assign(&y);

    let mut errors = Array1::<f64>::zeros(candidates.nrows());
    for (i, candidate) in candidates.rows().into_iter().enumerate() {
        x_ext.row_mut(n).assign(&candidate);
        let mut error = 0.0;
        for (h, &label) in classes.iter().enumerate() {
            y_ext[n] = label;
            let mut refit = clf.clone();
            refit.fit(x_ext.view(), y_ext.view())?;
            let risk = match method {
                ErrorMethod::Emr => emr_risk(refit.predict_proba(candidates)?.view(), cost_matrix),
                ErrorMethod::Csl => {
                    if labeled.is_empty() {
                        0.0
                    } else {
                        let p = refit.predict_proba(x_labeled.view())?;
                        csl_risk(p.view(), &y_labeled_idx, cost_matrix)
                    }
                }
                ErrorMethod::LogLoss => log_loss_risk(refit.predict_proba(candidates)?.view()),
            };
            tracing::trace!(candidate = i, class = label, risk, "refit");
            error += proba[[i, h]] * risk;
        }
        errors[i] = error;
    }

    Ok(-errors)
}

/// `sum_n sum_{a,b} P[n,a] * P[n,b] * C[a,b]`.
fn emr_risk(proba: ArrayView2<'_, f64>, cost_matrix: &Array2<f64>) -> f64 {
    proba
        .rows()
        .into_iter()
        .map(|p| p.dot(&cost_matrix.dot(&p)))
        .sum()
}

/// `sum_l sum_j P(x_l)[j] * C[y_l, j]`.
fn csl_risk(proba: ArrayView2<'_, f64>, y_idx: &[usize], cost_matrix: &Array2<f64>) -> f64 {
    proba
        .rows()
        .into_iter()
        .zip(y_idx)
        .map(|(p, &c)| p.dot(&cost_matrix.row(c)))
        .sum()
}

/// `-sum P * ln(P + eps)`.
fn log_loss_risk(proba: ArrayView2<'_, f64>) -> f64 {
    -proba.iter().map(|&p| p * (p + f64::EPSILON).ln()).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::ParzenWindowClassifier;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rstest::rstest;

    fn clf() -> ParzenWindowClassifier {
        ParzenWindowClassifier::builder()
            .classes(vec![0.0, 1.0])
            .build()
            .unwrap()
    }

    #[rstest]
    #[case("emr", ErrorMethod::Emr)]
    #[case("csl", ErrorMethod::Csl)]
    #[case("log_loss", ErrorMethod::LogLoss)]
    fn method_parses(#[case] s: &str, #[case] expected: ErrorMethod) {
        assert_eq!(s.parse::<ErrorMethod>().unwrap(), expected);
        assert_eq!(expected.to_string(), s);
    }

    #[rstest]
    #[case("String")]
    #[case("")]
    #[case("EMR")]
    fn unknown_method_is_value_error(#[case] s: &str) {
        assert_eq!(s.parse::<ErrorMethod>().unwrap_err().kind(), ErrorKind::Value);
    }

    #[test]
    fn emr_risk_matches_definition() {
        let p = array![[0.5, 0.5], [1.0, 0.0]];
        let c = zero_one_cost_matrix(2);
        // Row 1: 2 * 0.25 = 0.5; row 2: 0.
        assert_abs_diff_eq!(emr_risk(p.view(), &c), 0.5);
    }

    #[test]
    fn csl_risk_uses_true_class_row() {
        let p = array![[0.2, 0.8], [0.6, 0.4]];
        let c = array![[0.0, 1.0], [2.0, 0.0]];
        // Sample 0 has class 0: 0.8 * 1; sample 1 has class 1: 0.6 * 2.
        assert_abs_diff_eq!(csl_risk(p.view(), &[0, 1], &c), 0.8 + 1.2, epsilon = 1e-12);
    }

    #[test]
    fn log_loss_of_certain_prediction_is_zero() {
        let p = array![[1.0, 0.0]];
        assert_abs_diff_eq!(log_loss_risk(p.view()), 0.0, epsilon = 1e-12);
        let p = array![[0.5, 0.5]];
        assert_abs_diff_eq!(log_loss_risk(p.view()), 2.0f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn csl_without_labels_is_zero() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![f64::NAN, f64::NAN, f64::NAN];
        let u = expected_error_reduction(
            &clf(),
            x.view(),
            x.view(),
            y.view(),
            &zero_one_cost_matrix(2),
            ErrorMethod::Csl,
        )
        .unwrap();
        assert_abs_diff_eq!(u, Array1::<f64>::zeros(3));
    }

    #[test]
    fn utilities_are_non_positive_for_non_negative_costs() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, f64::NAN, f64::NAN, 1.0];
        for method in [ErrorMethod::Emr, ErrorMethod::Csl, ErrorMethod::LogLoss] {
            let u = expected_error_reduction(
                &clf(),
                x.view(),
                x.view(),
                y.view(),
                &zero_one_cost_matrix(2),
                method,
            )
            .unwrap();
            assert!(u.iter().all(|&v| v <= 1e-12), "{method}: {u}");
        }
    }

    #[test]
    fn class_mismatch_is_value_error() {
        let eer = ExpectedErrorReduction::new(clf(), vec![0.0, 2.0]);
        let x = array![[0.0], [1.0]];
        let y = array![0.0, f64::NAN];
        let err = eer.query(&QueryRequest::new(x.view(), y.view())).unwrap_err();
        assert!(matches!(err, QueryError::ClassMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Value);
    }

    #[test]
    fn missing_label_mismatch_is_value_error() {
        let eer = ExpectedErrorReduction::new(clf(), vec![0.0, 1.0]).with_missing_label(MissingLabel::new(-1.0));
        let x = array![[0.0], [1.0]];
        let y = array![0.0, -1.0];
        assert!(eer.query(&QueryRequest::new(x.view(), y.view())).is_err());
    }

    #[test]
    fn bad_cost_matrix_is_value_error() {
        let eer = ExpectedErrorReduction::new(clf(), vec![0.0, 1.0]).with_cost_matrix(zero_one_cost_matrix(3));
        assert_eq!(eer.validate().unwrap_err().kind(), ErrorKind::Value);
    }

    #[test]
    fn utilities_live_in_sample_space() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, f64::NAN, f64::NAN, 1.0];
        let eer = ExpectedErrorReduction::new(clf(), vec![0.0, 1.0]);
        let result = eer
            .query(&QueryRequest::new(x.view(), y.view()).with_return_utilities(true))
            .unwrap();
        let u = result.utilities.unwrap();
        assert_eq!(u.dim(), (1, 4));
        assert!(u[[0, 0]].is_nan() && u[[0, 3]].is_nan());
        assert!(!u[[0, 1]].is_nan() && !u[[0, 2]].is_nan());
    }
}
