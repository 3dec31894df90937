//! Query strategies.
//!
//! Every strategy implements [`QueryStrategy`]: given a partially labeled
//! dataset it returns the indices of the samples whose labels should be
//! acquired next, optionally together with the utilities behind each pick.
//!
//! # Strategies
//!
//! - [`ExpectedErrorReduction`]: refit under hypothetical labels, score risk.
//! - [`CoreSet`]: greedy farthest-point covering of the feature space.
//! - [`QueryByCommittee`]: disagreement among a committee of classifiers.
//! - [`TypiClust`]: most typical sample of the largest uncovered cluster.
//! - [`McPal`]: closed-form probabilistic gain from kernel frequencies.
//!
//! # Wrappers
//!
//! - [`SubSamplingWrapper`]: evaluates a random sub-sample of the pool.
//! - [`ParallelUtilityEstimationWrapper`]: splits the pool across threads.
//!
//! Wrappers take the same [`QueryRequest`] as the strategies they wrap, so
//! they compose freely.

mod committee;
mod core_set;
mod expected_error;
mod parallel;
mod probal;
mod subsampling;
mod typi_clust;

pub use committee::{CommitteeMethod, QueryByCommittee};
pub use core_set::{CoreSet, CoreSetMethod, k_greedy_center};
pub use expected_error::{ErrorMethod, ExpectedErrorReduction, expected_error_reduction};
pub use parallel::{ParallelBackend, ParallelUtilityEstimationWrapper};
pub use probal::{McPal, cost_reduction};
pub use subsampling::{MaxCandidates, SubSamplingWrapper};
pub use typi_clust::{TypiClust, typicality};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;

use crate::candidates::{Candidates, check_candidates};
use crate::error::{QueryError, Result};
use crate::labels::MissingLabel;
use crate::options::{NO_OPTIONS, QueryOptions};
use crate::selection::simple_batch;
use crate::validation::{check_batch_size, check_x_y};

// =============================================================================
// Request / Result
// =============================================================================

/// Arguments of a single query call.
///
/// # Example
///
/// ```
/// use alpool::strategy::QueryRequest;
/// use alpool::candidates::Candidates;
/// use ndarray::array;
///
/// let x = array![[0.0], [1.0], [2.0]];
/// let y = array![0.0, f64::NAN, f64::NAN];
/// let idx = [1, 2];
/// let request = QueryRequest::new(x.view(), y.view())
///     .with_candidates(Candidates::Indices(&idx))
///     .with_batch_size(2)
///     .with_return_utilities(true);
/// assert_eq!(request.batch_size, 2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct QueryRequest<'a> {
    /// Training features, shape `(n_samples, n_features)`.
    pub x: ArrayView2<'a, f64>,
    /// Labels, missing entries equal the strategy's missing label.
    pub y: ArrayView1<'a, f64>,
    /// Which samples may be selected. Default: all unlabeled rows of `x`.
    pub candidates: Candidates<'a>,
    /// Number of samples to select. Default: 1.
    pub batch_size: usize,
    /// Whether to return the utility history.
    pub return_utilities: bool,
    /// Strategy-specific options, forwarded verbatim by wrappers.
    pub options: &'a QueryOptions,
}

impl<'a> QueryRequest<'a> {
    pub fn new(x: ArrayView2<'a, f64>, y: ArrayView1<'a, f64>) -> Self {
        Self {
            x,
            y,
            candidates: Candidates::Unlabeled,
            batch_size: 1,
            return_utilities: false,
            options: &NO_OPTIONS,
        }
    }

    pub fn with_candidates(mut self, candidates: Candidates<'a>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_return_utilities(mut self, return_utilities: bool) -> Self {
        self.return_utilities = return_utilities;
        self
    }

    pub fn with_options(mut self, options: &'a QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Copy of this request borrowed for a shorter lifetime.
    ///
    /// Array views are invariant in their lifetime, so a wrapper that hands
    /// locally owned candidates to its inner strategy narrows the request first.
    pub fn reborrow<'b>(&'b self) -> QueryRequest<'b>
    where
        'a: 'b,
    {
        QueryRequest {
            x: self.x.reborrow(),
            y: self.y.reborrow(),
            candidates: self.candidates.reborrow(),
            batch_size: self.batch_size,
            return_utilities: self.return_utilities,
            options: self.options,
        }
    }

    /// Shape and sanity checks shared by all strategies.
    ///
    /// # Errors
    ///
    /// Value errors for mismatched lengths, `batch_size == 0`, out-of-range
    /// candidate indices or candidate features of the wrong width.
    pub fn validate(&self, missing_label: MissingLabel) -> Result<()> {
        check_x_y(self.x, self.y, missing_label)?;
        check_batch_size(self.batch_size)?;
        check_candidates(self.x, &self.candidates)
    }

    /// Number of utility columns: rows of `x` with a mapping, candidates otherwise.
    pub fn utility_width(&self) -> usize {
        match self.candidates {
            Candidates::Features(features) => features.nrows(),
            _ => self.x.nrows(),
        }
    }
}

/// Outcome of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Selected indices, most preferred first.
    pub indices: Vec<usize>,
    /// Utility history, shape `(indices.len(), width)`, if requested.
    pub utilities: Option<Array2<f64>>,
}

impl QueryResult {
    /// Number of selected samples.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

// =============================================================================
// Strategy trait
// =============================================================================

/// A pool-based query strategy.
pub trait QueryStrategy: Send + Sync {
    /// Select the next batch of samples to label.
    fn query(&self, request: &QueryRequest<'_>) -> Result<QueryResult>;

    /// Sentinel this strategy treats as "not yet labeled".
    fn missing_label(&self) -> MissingLabel {
        MissingLabel::default()
    }
}

impl<Q: QueryStrategy + ?Sized> QueryStrategy for &Q {
    fn query(&self, request: &QueryRequest<'_>) -> Result<QueryResult> {
        (**self).query(request)
    }

    fn missing_label(&self) -> MissingLabel {
        (**self).missing_label()
    }
}

impl<Q: QueryStrategy + ?Sized> QueryStrategy for Box<Q> {
    fn query(&self, request: &QueryRequest<'_>) -> Result<QueryResult> {
        (**self).query(request)
    }

    fn missing_label(&self) -> MissingLabel {
        (**self).missing_label()
    }
}

/// A wrapper and the strategy it wraps must agree on the missing label.
pub(crate) fn check_wrapped_missing_label<Q: QueryStrategy + ?Sized>(
    missing_label: MissingLabel,
    inner: &Q,
) -> Result<()> {
    let expected = inner.missing_label();
    if missing_label != expected {
        return Err(QueryError::invalid_value(
            "missing_label",
            format!(
                "{} differs from the wrapped strategy's missing label {}",
                missing_label.value(),
                expected.value()
            ),
        ));
    }
    Ok(())
}

/// Reduce one-shot utilities (in the caller's index space) to a batch.
pub(crate) fn select_batch<R: Rng + ?Sized>(
    utilities: Array1<f64>,
    batch_size: usize,
    return_utilities: bool,
    rng: &mut R,
) -> Result<QueryResult> {
    let (indices, history) = simple_batch(utilities.view(), batch_size, rng)?;
    Ok(QueryResult {
        indices,
        utilities: return_utilities.then_some(history),
    })
}

/// Assemble a result from per-step utility rows.
pub(crate) fn result_from_rows(
    indices: Vec<usize>,
    rows: Vec<Array1<f64>>,
    width: usize,
    return_utilities: bool,
) -> QueryResult {
    let utilities = return_utilities.then(|| {
        let mut history = Array2::from_elem((rows.len(), width), f64::NAN);
        for (mut out, row) in history.axis_iter_mut(Axis(0)).zip(&rows) {
            out.assign(row);
        }
        history
    });
    QueryResult { indices, utilities }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn request_defaults() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, f64::NAN];
        let r = QueryRequest::new(x.view(), y.view());
        assert_eq!(r.batch_size, 1);
        assert!(!r.return_utilities);
        assert!(r.options.is_empty());
        assert!(matches!(r.candidates, Candidates::Unlabeled));
        assert_eq!(r.utility_width(), 2);
    }

    #[test]
    fn request_validation() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, f64::NAN];
        let missing = MissingLabel::default();
        assert!(QueryRequest::new(x.view(), y.view()).validate(missing).is_ok());
        assert!(
            QueryRequest::new(x.view(), y.view())
                .with_batch_size(0)
                .validate(missing)
                .is_err()
        );
        let idx = [5];
        assert!(
            QueryRequest::new(x.view(), y.view())
                .with_candidates(Candidates::Indices(&idx))
                .validate(missing)
                .is_err()
        );
    }

    fn narrowed_candidates(request: &QueryRequest<'_>) -> usize {
        let local = vec![1, 0];
        let inner = request.reborrow().with_candidates(Candidates::Indices(&local));
        match inner.candidates {
            Candidates::Indices(indices) => indices.len() + inner.batch_size,
            _ => 0,
        }
    }

    #[test]
    fn reborrowed_request_accepts_local_candidates() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, f64::NAN];
        let request = QueryRequest::new(x.view(), y.view()).with_batch_size(3);
        assert_eq!(narrowed_candidates(&request), 5);

        let cand = array![[2.0], [3.0], [4.0]];
        let request = request.with_candidates(Candidates::Features(cand.view()));
        let narrowed = request.reborrow();
        assert_eq!(narrowed.utility_width(), 3);
        assert_eq!(narrowed.x, x.view());
    }

    #[test]
    fn rows_are_padded_into_history() {
        let r = result_from_rows(vec![1], vec![array![f64::NAN, 0.5, 0.2]], 3, true);
        let u = r.utilities.unwrap();
        assert_eq!(u.dim(), (1, 3));
        assert_eq!(u[[0, 1]], 0.5);
        let r = result_from_rows(vec![1], vec![array![0.0]], 1, false);
        assert!(r.utilities.is_none());
    }
}
