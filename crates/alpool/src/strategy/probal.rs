//! Multi-class probabilistic active learning (McPAL).
//!
//! Kernel class frequencies `k` at a candidate are treated as pseudo-counts
//! of a Dirichlet posterior. For every hypothetical label vector `l` with up
//! to `m_max` additional labels the expected misclassification cost of the
//! resulting decision is available in closed form; the gain of a candidate
//! is the best cost reduction per hypothetical label.
//!
//! Beta functions are evaluated in log-space (`ln_gamma`) to stay finite for
//! large frequencies.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use statrs::function::factorial::ln_factorial;
use statrs::function::gamma::ln_gamma;

use super::{QueryRequest, QueryResult, QueryStrategy, select_batch};
use crate::candidates::resolve_candidates;
use crate::error::{QueryError, Result};
use crate::labels::MissingLabel;
use crate::model::ClassFrequencyEstimator;
use crate::utils::seeded_rng;
use crate::validation::{check_cost_matrix, zero_one_cost_matrix};

/// McPAL query strategy.
///
/// # Example
///
/// ```
/// use alpool::model::ParzenWindowClassifier;
/// use alpool::strategy::{McPal, QueryRequest, QueryStrategy};
/// use ndarray::array;
///
/// let clf = ParzenWindowClassifier::builder().classes(vec![0.0, 1.0]).build().unwrap();
/// let pal = McPal::new(clf).with_m_max(2).unwrap();
/// let x = array![[0.0], [0.5], [4.0], [5.0]];
/// let y = array![0.0, f64::NAN, f64::NAN, 1.0];
/// let result = pal.query(&QueryRequest::new(x.view(), y.view())).unwrap();
/// assert_eq!(result.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct McPal<C> {
    /// Frequency estimator; cloned and fitted per query.
    pub clf: C,
    /// Dirichlet prior added to every class frequency. Default: 1.
    pub prior: f64,
    /// Maximum number of hypothetical labels. Default: 1.
    pub m_max: usize,
    /// Cost matrix `C[true, predicted]`. `None` means 0/1 loss.
    pub cost_matrix: Option<Array2<f64>>,
    /// Seed for tie-breaking.
    pub seed: u64,
}

impl<C: ClassFrequencyEstimator> McPal<C> {
    pub fn new(clf: C) -> Self {
        Self {
            clf,
            prior: 1.0,
            m_max: 1,
            cost_matrix: None,
            seed: 0,
        }
    }

    /// # Errors
    ///
    /// [`QueryError::InvalidValue`] unless `prior` is positive and finite.
    pub fn with_prior(mut self, prior: f64) -> Result<Self> {
        self.prior = prior;
        self.validate()?;
        Ok(self)
    }

    /// # Errors
    ///
    /// [`QueryError::InvalidValue`] if `m_max == 0`.
    pub fn with_m_max(mut self, m_max: usize) -> Result<Self> {
        self.m_max = m_max;
        self.validate()?;
        Ok(self)
    }

    pub fn with_cost_matrix(mut self, cost_matrix: Array2<f64>) -> Self {
        self.cost_matrix = Some(cost_matrix);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.prior > 0.0 && self.prior.is_finite()) {
            return Err(QueryError::invalid_value(
                "prior",
                format!("must be > 0, got {}", self.prior),
            ));
        }
        if self.m_max == 0 {
            return Err(QueryError::invalid_value("m_max", "must be >= 1, got 0"));
        }
        if let Some(cost_matrix) = &self.cost_matrix {
            check_cost_matrix(cost_matrix, self.clf.classes().len())?;
        }
        Ok(())
    }
}

impl<C: ClassFrequencyEstimator> QueryStrategy for McPal<C> {
    fn query(&self, request: &QueryRequest<'_>) -> Result<QueryResult> {
        self.validate()?;
        let missing_label = self.clf.missing_label();
        request.validate(missing_label)?;

        let resolved = resolve_candidates(request.x, request.y, &request.candidates, missing_label)?;
        let mut clf = self.clf.clone();
        clf.fit(request.x, request.y)?;
        let freq = clf.predict_freq(resolved.features.view())?;

        let cost_matrix = self
            .cost_matrix
            .clone()
            .unwrap_or_else(|| zero_one_cost_matrix(clf.classes().len()));
        tracing::debug!(n_candidates = resolved.n_candidates(), m_max = self.m_max, "mcpal");
        let gains = cost_reduction(freq.view(), &cost_matrix, self.m_max, self.prior)?;

        let utilities = resolved.scatter(gains.view(), request.x.nrows());
        let mut rng = seeded_rng(self.seed);
        select_batch(utilities, request.batch_size, request.return_utilities, &mut rng)
    }

    fn missing_label(&self) -> MissingLabel {
        self.clf.missing_label()
    }
}

// =============================================================================
// Closed-form cost reduction
// =============================================================================

/// Expected cost reduction per sample for frequency vectors `k_vecs`.
///
/// `k_vecs` has shape `(n_samples, n_classes)`. The result is the maximum over
/// `m in 1..=m_max` of `(cost(0) - cost(m)) / m`.
///
/// # Errors
///
/// [`QueryError::InvalidValue`] for a cost matrix of the wrong shape,
/// `m_max == 0` or a non-positive prior.
pub fn cost_reduction(
    k_vecs: ArrayView2<'_, f64>,
    cost_matrix: &Array2<f64>,
    m_max: usize,
    prior: f64,
) -> Result<Array1<f64>> {
    let n_classes = k_vecs.ncols();
    check_cost_matrix(cost_matrix, n_classes)?;
    if m_max == 0 {
        return Err(QueryError::invalid_value("m_max", "must be >= 1, got 0"));
    }
    if !(prior > 0.0 && prior.is_finite()) {
        return Err(QueryError::invalid_value("prior", format!("must be > 0, got {prior}")));
    }

    let l_vecs: Vec<Vec<usize>> = (0..=m_max).flat_map(|m| label_vectors(m, n_classes)).collect();
    let ln_mult: Vec<f64> = l_vecs.iter().map(|l| ln_multinomial(l)).collect();

    let gains = k_vecs
        .rows()
        .into_iter()
        .map(|k| {
            let kp: Vec<f64> = k.iter().map(|&v| v + prior).collect();
            let ln_b_kp = ln_beta(&kp);
            let mut m_sums = vec![0.0; m_max + 1];
            let mut shifted = vec![0.0; n_classes];

            for (l, &ln_m) in l_vecs.iter().zip(&ln_mult) {
                let m: usize = l.iter().sum();
                let y_hat = bayes_decision(k, l, cost_matrix);
                let mut cost = 0.0;
                for c in 0..n_classes {
                    for (j, s) in shifted.iter_mut().enumerate() {
                        *s = kp[j] + l[j] as f64 + if j == c { 1.0 } else { 0.0 };
                    }
                    cost += cost_matrix[[c, y_hat]] * (ln_beta(&shifted) - ln_b_kp).exp();
                }
                m_sums[m] += ln_m.exp() * cost;
            }

            (1..=m_max)
                .map(|m| (m_sums[0] - m_sums[m]) / m as f64)
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .collect();
    Ok(gains)
}

/// Cost-minimizing class for counts `k + l` (first minimum wins).
fn bayes_decision(k: ArrayView1<'_, f64>, l: &[usize], cost_matrix: &Array2<f64>) -> usize {
    let n_classes = l.len();
    let mut best = 0;
    let mut best_cost = f64::INFINITY;
    for j in 0..n_classes {
        let cost: f64 = (0..n_classes)
            .map(|i| (k[i] + l[i] as f64) * cost_matrix[[i, j]])
            .sum();
        if cost < best_cost {
            best = j;
            best_cost = cost;
        }
    }
    best
}

/// All vectors of `n_classes` non-negative integers summing to `m`.
fn label_vectors(m: usize, n_classes: usize) -> Vec<Vec<usize>> {
    fn recurse(remaining: usize, slots: usize, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if slots == 1 {
            prefix.push(remaining);
            out.push(prefix.clone());
            prefix.pop();
            return;
        }
        for v in 0..=remaining {
            prefix.push(v);
            recurse(remaining - v, slots - 1, prefix, out);
            prefix.pop();
        }
    }

    let mut out = Vec::new();
    if n_classes > 0 {
        recurse(m, n_classes, &mut Vec::with_capacity(n_classes), &mut out);
    }
    out
}

/// `ln B(a) = sum ln Gamma(a_i) - ln Gamma(sum a_i)`.
fn ln_beta(a: &[f64]) -> f64 {
    a.iter().map(|&v| ln_gamma(v)).sum::<f64>() - ln_gamma(a.iter().sum())
}

/// `ln (sum l)! / prod l_i!`.
fn ln_multinomial(l: &[usize]) -> f64 {
    let m: usize = l.iter().sum();
    ln_factorial(m as u64) - l.iter().map(|&v| ln_factorial(v as u64)).sum::<f64>()
}
