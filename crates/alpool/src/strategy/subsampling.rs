//! Random candidate sub-sampling around another strategy.
//!
//! Expensive strategies scale with the candidate pool. The wrapper draws a
//! random subset of at most `max_candidates` candidates and lets the wrapped
//! strategy choose among those only. Utilities of candidates that were not
//! drawn are `NaN`.

use ndarray::{Array2, Axis};
use rand::seq::index::sample;

use super::{QueryRequest, QueryResult, QueryStrategy, check_wrapped_missing_label};
use crate::candidates::Candidates;
use crate::error::{QueryError, Result};
use crate::labels::{MissingLabel, labeled_indices, unlabeled_indices};
use crate::options::OptionValue;
use crate::utils::seeded_rng;

// =============================================================================
// MaxCandidates
// =============================================================================

/// Upper bound on the number of candidates handed to the wrapped strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxCandidates {
    /// At most this many candidates (`>= 1`).
    Count(usize),
    /// This fraction of the pool, rounded up (`0 < f <= 1`).
    Fraction(f64),
}

impl MaxCandidates {
    /// # Errors
    ///
    /// [`QueryError::InvalidValue`] for a zero count or a fraction outside `(0, 1]`.
    pub fn validate(self) -> Result<()> {
        match self {
            MaxCandidates::Count(0) => Err(QueryError::invalid_value(
                "max_candidates",
                "must be >= 1, got 0",
            )),
            MaxCandidates::Fraction(f) if !(f > 0.0 && f <= 1.0) => Err(QueryError::invalid_value(
                "max_candidates",
                format!("must be in (0, 1] when given as a fraction, got {f}"),
            )),
            _ => Ok(()),
        }
    }

    /// Number of candidates to draw from a pool of `pool` candidates.
    pub fn resolve(self, pool: usize) -> usize {
        let wanted = match self {
            MaxCandidates::Count(n) => n,
            MaxCandidates::Fraction(f) => (pool as f64 * f).ceil() as usize,
        };
        if wanted > pool {
            tracing::warn!(
                max_candidates = wanted,
                available = pool,
                "max_candidates is larger than the candidate pool; using the whole pool"
            );
        }
        wanted.min(pool)
    }
}

impl Default for MaxCandidates {
    fn default() -> Self {
        MaxCandidates::Fraction(1.0)
    }
}

impl TryFrom<OptionValue> for MaxCandidates {
    type Error = QueryError;

    fn try_from(value: OptionValue) -> Result<Self> {
        let max_candidates = match value {
            OptionValue::Int(n) => MaxCandidates::Count(usize::try_from(n).map_err(|_| {
                QueryError::invalid_value("max_candidates", format!("must be >= 1, got {n}"))
            })?),
            OptionValue::Float(f) => MaxCandidates::Fraction(f),
            other => {
                return Err(QueryError::invalid_type(
                    "max_candidates",
                    "an integer or a float",
                    other.to_string(),
                ));
            }
        };
        max_candidates.validate()?;
        Ok(max_candidates)
    }
}

// =============================================================================
// SubSamplingWrapper
// =============================================================================

/// Runs a strategy on a random sub-sample of the candidates.
///
/// The sub-sample generator mixes `seed` with the number of labeled samples,
/// so successive rounds of an active learning loop see different,
/// reproducible subsets, also with the default seed `0`.
///
/// # Example
///
/// ```
/// use alpool::strategy::{CoreSet, MaxCandidates, QueryRequest, QueryStrategy, SubSamplingWrapper};
/// use ndarray::Array2;
///
/// let inner = CoreSet::builder().build().unwrap();
/// let wrapper = SubSamplingWrapper::new(inner).with_max_candidates(MaxCandidates::Count(3));
///
/// let x = Array2::from_shape_fn((10, 1), |(i, _)| i as f64);
/// let mut y = ndarray::Array1::from_elem(10, f64::NAN);
/// y[0] = 0.0;
/// let result = wrapper
///     .query(&QueryRequest::new(x.view(), y.view()).with_return_utilities(true))
///     .unwrap();
/// let utilities = result.utilities.unwrap();
/// assert_eq!(utilities.row(0).iter().filter(|u| !u.is_nan()).count(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct SubSamplingWrapper<Q> {
    /// Strategy evaluated on the sub-sample.
    pub inner: Q,
    /// Sub-sample size. Default: the whole pool.
    pub max_candidates: MaxCandidates,
    /// Missing-label sentinel. Default: the wrapped strategy's.
    pub missing_label: MissingLabel,
    /// Base seed of the sub-sampling.
    pub seed: u64,
}

impl<Q: QueryStrategy> SubSamplingWrapper<Q> {
    pub fn new(inner: Q) -> Self {
        Self {
            missing_label: inner.missing_label(),
            inner,
            max_candidates: MaxCandidates::default(),
            seed: 0,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: MaxCandidates) -> Self {
        self.max_candidates = max_candidates;
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
}

impl<Q: QueryStrategy> QueryStrategy for SubSamplingWrapper<Q> {
    fn query(&self, request: &QueryRequest<'_>) -> Result<QueryResult> {
        self.max_candidates.validate()?;
        check_wrapped_missing_label(self.missing_label, &self.inner)?;
        request.validate(self.missing_label)?;

        let n_labeled = labeled_indices(request.y, self.missing_label).len();
        let mut rng = seeded_rng(round_seed(self.seed, n_labeled));

        match request.candidates {
            Candidates::Unlabeled | Candidates::Indices(_) => {
                let pool = match request.candidates {
                    Candidates::Indices(indices) => indices.to_vec(),
                    _ => unlabeled_indices(request.y, self.missing_label),
                };
                let n_draw = self.max_candidates.resolve(pool.len());
                let subset: Vec<usize> = sample(&mut rng, pool.len(), n_draw)
                    .into_iter()
                    .map(|i| pool[i])
                    .collect();
                tracing::debug!(pool = pool.len(), drawn = subset.len(), "sub-sampled candidates");

                // Indices and utilities are already in the caller's frame.
                let inner_request = request.reborrow().with_candidates(Candidates::Indices(&subset));
                self.inner.query(&inner_request)
            }
            Candidates::Features(features) => {
                let n_draw = self.max_candidates.resolve(features.nrows());
                let picked = sample(&mut rng, features.nrows(), n_draw).into_vec();
                let subset = features.select(Axis(0), &picked);
                tracing::debug!(pool = features.nrows(), drawn = picked.len(), "sub-sampled candidates");

                let inner_request = request.reborrow().with_candidates(Candidates::Features(subset.view()));
                let inner = self.inner.query(&inner_request)?;

                let indices = inner.indices.iter().map(|&i| picked[i]).collect();
                let utilities = inner.utilities.map(|u| {
                    let mut full = Array2::from_elem((u.nrows(), features.nrows()), f64::NAN);
                    for (col, &target) in picked.iter().enumerate() {
                        full.column_mut(target).assign(&u.column(col));
                    }
                    full
                });
                Ok(QueryResult { indices, utilities })
            }
        }
    }

    fn missing_label(&self) -> MissingLabel {
        self.missing_label
    }
}

/// Seed of one sub-sampling round; differs per labeled count for any `seed`.
fn round_seed(seed: u64, n_labeled: usize) -> u64 {
    seed ^ (n_labeled as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
