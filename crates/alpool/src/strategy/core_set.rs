//! Core-Set selection via greedy k-center covering.
//!
//! The batch is built one sample at a time: each step picks the candidate
//! farthest from its nearest reference point, where the reference set holds
//! the labeled samples plus everything picked so far. The resulting batch
//! spreads over the candidate pool like a covering of the feature space.

use std::fmt;
use std::str::FromStr;

use bon::Builder;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, concatenate, s};
use rand::Rng;

use super::{QueryRequest, QueryResult, QueryStrategy};
use crate::candidates::{Candidates, resolve_candidates};
use crate::error::{QueryError, Result};
use crate::labels::{MissingLabel, labeled_indices, unlabeled_indices};
use crate::selection::rand_argmax;
use crate::utils::{euclidean, min_distances, seeded_rng};
use crate::validation::{check_batch_size, check_x_y};

// =============================================================================
// CoreSetMethod
// =============================================================================

/// Core-Set construction method. Only greedy k-center is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoreSetMethod {
    #[default]
    Greedy,
}

impl fmt::Display for CoreSetMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("greedy")
    }
}

impl FromStr for CoreSetMethod {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "greedy" => Ok(CoreSetMethod::Greedy),
            other => Err(QueryError::invalid_value(
                "method",
                format!("must be \"greedy\", got {other:?}"),
            )),
        }
    }
}

// =============================================================================
// CoreSet
// =============================================================================

/// Core-Set query strategy.
///
/// # Example
///
/// ```
/// use alpool::strategy::{CoreSet, QueryRequest, QueryStrategy};
/// use ndarray::array;
///
/// let core_set = CoreSet::builder().seed(42).build().unwrap();
/// let x = array![[0.0], [1.0], [5.0], [10.0]];
/// let y = array![0.0, f64::NAN, f64::NAN, f64::NAN];
/// let result = core_set.query(&QueryRequest::new(x.view(), y.view())).unwrap();
/// assert_eq!(result.indices, vec![3]);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct CoreSet {
    /// Construction method. Default: greedy.
    #[builder(default)]
    pub method: CoreSetMethod,

    /// Missing-label sentinel. Default: `NaN`.
    #[builder(default)]
    pub missing_label: MissingLabel,

    /// Seed for tie-breaking. Default: 0.
    #[builder(default)]
    pub seed: u64,
}

impl<S: core_set_builder::IsComplete> CoreSetBuilder<S> {
    /// Build and validate the strategy.
    pub fn build(self) -> Result<CoreSet> {
        let core_set = self.__build_internal();
        core_set.validate()?;
        Ok(core_set)
    }
}

impl CoreSet {
    fn validate(&self) -> Result<()> {
        match self.method {
            CoreSetMethod::Greedy => Ok(()),
        }
    }
}

impl QueryStrategy for CoreSet {
    fn query(&self, request: &QueryRequest<'_>) -> Result<QueryResult> {
        self.validate()?;
        request.validate(self.missing_label)?;
        let mut rng = seeded_rng(self.seed);

        let (indices, utilities) = match request.candidates {
            Candidates::Features(features) => {
                // Raw candidates are appended to X as unlabeled rows.
                let n = request.x.nrows();
                let n_cand = features.nrows();
                let x_ext = if n == 0 {
                    features.to_owned()
                } else {
                    concatenate(Axis(0), &[request.x, features]).map_err(|_| {
                        QueryError::FeatureMismatch {
                            x_features: request.x.ncols(),
                            candidate_features: features.ncols(),
                        }
                    })?
                };
                let mut y_ext = Array1::from_elem(n + n_cand, self.missing_label.value());
                y_ext.slice_mut(s![..n]).assign(&request.y);
                let mapping: Vec<usize> = (n..n + n_cand).collect();
                k_greedy_center(
                    x_ext.view(),
                    y_ext.view(),
                    request.batch_size,
                    &mut rng,
                    self.missing_label,
                    Some(&mapping),
                    Some(n_cand),
                )?
            }
            _ => {
                let resolved = resolve_candidates(request.x, request.y, &request.candidates, self.missing_label)?;
                k_greedy_center(
                    request.x,
                    request.y,
                    request.batch_size,
                    &mut rng,
                    self.missing_label,
                    resolved.mapping.as_deref(),
                    None,
                )?
            }
        };

        Ok(QueryResult {
            indices,
            utilities: request.return_utilities.then_some(utilities),
        })
    }

    fn missing_label(&self) -> MissingLabel {
        self.missing_label
    }
}

// =============================================================================
// k-greedy-center
// =============================================================================

/// Greedy k-center selection over the rows of `x` listed in `mapping`.
///
/// The reference set starts as the labeled rows of `x`. Each step the
/// candidate with the largest distance to its nearest reference point is
/// picked (random tie-break) and added to the reference set. With no
/// reference point yet every candidate has utility `0`.
///
/// `mapping` defaults to the unlabeled rows. With `n_new_cand = Some(k)` the
/// last `k` rows of `x` are treated as externally supplied candidates:
/// indices and utility columns are reported relative to those rows.
///
/// # Returns
///
/// `(indices, utilities)`; `utilities` has one row per pick and one column
/// per row of `x` (or per new candidate), `NaN` for non-candidates and
/// earlier picks.
///
/// # Errors
///
/// - [`QueryError::InvalidType`] if `n_new_cand` is given without `mapping`.
/// - [`QueryError::InvalidValue`] if `n_new_cand` exceeds the mapping or the
///   mapping reaches outside the last `n_new_cand` rows.
/// - Shape and batch-size errors as for any query.
pub fn k_greedy_center<R: Rng + ?Sized>(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    batch_size: usize,
    rng: &mut R,
    missing_label: MissingLabel,
    mapping: Option<&[usize]>,
    n_new_cand: Option<usize>,
) -> Result<(Vec<usize>, Array2<f64>)> {
    check_x_y(x, y, missing_label)?;
    check_batch_size(batch_size)?;

    let n_samples = x.nrows();
    let mapping: Vec<usize> = match (mapping, n_new_cand) {
        (None, Some(_)) => {
            return Err(QueryError::invalid_type(
                "n_new_cand",
                "None when mapping is None",
                "an integer",
            ));
        }
        (None, None) => unlabeled_indices(y, missing_label),
        (Some(m), _) => m.to_vec(),
    };
    if let Some(&index) = mapping.iter().find(|&&i| i >= n_samples) {
        return Err(QueryError::IndexOutOfBounds { index, n_samples });
    }

    let offset = match n_new_cand {
        Some(k) if k > mapping.len() || k > n_samples => {
            return Err(QueryError::invalid_value(
                "n_new_cand",
                format!("must be <= len(mapping) = {}, got {k}", mapping.len()),
            ));
        }
        Some(k) => {
            let offset = n_samples - k;
            if mapping.iter().any(|&i| i < offset) {
                return Err(QueryError::invalid_value(
                    "mapping",
                    format!("must only address the last {k} rows of X"),
                ));
            }
            offset
        }
        None => 0,
    };

    let batch_size = if mapping.len() < batch_size {
        tracing::warn!(
            requested = batch_size,
            available = mapping.len(),
            "batch_size is larger than the number of candidates; shrinking the batch"
        );
        mapping.len()
    } else {
        batch_size
    };

    // Distance from each candidate to its nearest reference point.
    let reference = labeled_indices(y, missing_label);
    let mut min_dist = min_distances(
        x.select(Axis(0), &mapping).view(),
        x.select(Axis(0), &reference).view(),
    );
    let mut selected = vec![false; mapping.len()];

    let width = n_samples - offset;
    let mut indices = Vec::with_capacity(batch_size);
    let mut rows = Vec::with_capacity(batch_size);
    for _ in 0..batch_size {
        let mut utilities = Array1::from_elem(width, f64::NAN);
        for (pos, &row) in mapping.iter().enumerate() {
            if !selected[pos] {
                let d = min_dist[pos];
                utilities[row - offset] = if d.is_finite() { d } else { 0.0 };
            }
        }

        let best = rand_argmax(utilities.view(), rng)?;
        let best_row = best + offset;
        for (pos, &row) in mapping.iter().enumerate() {
            if row == best_row {
                selected[pos] = true;
            }
            let d = euclidean(x.row(row), x.row(best_row));
            if d < min_dist[pos] {
                min_dist[pos] = d;
            }
        }

        tracing::trace!(pick = best, "core-set pick");
        indices.push(best);
        rows.push(utilities);
    }

    let mut history = Array2::from_elem((rows.len(), width), f64::NAN);
    for (mut out, row) in history.rows_mut().into_iter().zip(&rows) {
        out.assign(row);
    }
    Ok((indices, history))
}
