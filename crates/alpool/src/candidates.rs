//! Candidate resolution.
//!
//! A query can name its candidates in three ways (see [`Candidates`]). This
//! module turns any of them into a concrete feature matrix plus, when the
//! candidates are rows of `X`, the mapping from candidate position to row.
//!
//! # Index spaces
//!
//! - With a mapping (`Unlabeled` / `Indices`), utilities have one column per
//!   row of `X` and returned indices address rows of `X`.
//! - Without a mapping (`Features`), utilities have one column per candidate
//!   and returned indices address rows of the candidate matrix.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{QueryError, Result};
use crate::labels::{MissingLabel, unlabeled_indices};

/// Which samples a query may select.
#[derive(Debug, Clone, Copy, Default)]
pub enum Candidates<'a> {
    /// Every row of `X` whose label is missing.
    #[default]
    Unlabeled,
    /// Explicit rows of `X`, regardless of their label status.
    Indices(&'a [usize]),
    /// Standalone feature vectors, not necessarily contained in `X`.
    Features(ArrayView2<'a, f64>),
}

impl Candidates<'_> {
    /// Whether the candidates correspond to rows of `X`.
    #[inline]
    pub fn has_mapping(&self) -> bool {
        !matches!(self, Candidates::Features(_))
    }

    /// The same candidates borrowed for a shorter lifetime.
    pub fn reborrow<'b>(&'b self) -> Candidates<'b> {
        match *self {
            Candidates::Unlabeled => Candidates::Unlabeled,
            Candidates::Indices(indices) => Candidates::Indices(indices),
            Candidates::Features(features) => Candidates::Features(features.reborrow()),
        }
    }
}

/// Candidates materialized as a feature matrix.
#[derive(Debug, Clone)]
pub struct ResolvedCandidates {
    /// Candidate features, shape `(n_candidates, n_features)`.
    pub features: Array2<f64>,
    /// Row of `X` for each candidate; `None` for standalone features.
    pub mapping: Option<Vec<usize>>,
}

impl ResolvedCandidates {
    /// Number of candidates.
    #[inline]
    pub fn n_candidates(&self) -> usize {
        self.features.nrows()
    }

    /// Number of utility columns in the caller's index space.
    #[inline]
    pub fn utility_width(&self, n_samples: usize) -> usize {
        match self.mapping {
            Some(_) => n_samples,
            None => self.n_candidates(),
        }
    }

    /// Mapping, or [`QueryError::MappingRequired`] for standalone features.
    pub fn require_mapping(&self, strategy: &'static str) -> Result<&[usize]> {
        self.mapping
            .as_deref()
            .ok_or(QueryError::MappingRequired { strategy })
    }

    /// Place per-candidate values into the caller's index space.
    ///
    /// Positions that are not candidates are `NaN`.
    pub fn scatter(&self, values: ArrayView1<'_, f64>, n_samples: usize) -> Array1<f64> {
        match &self.mapping {
            Some(mapping) => {
                let mut out = Array1::from_elem(n_samples, f64::NAN);
                for (&row, &value) in mapping.iter().zip(values.iter()) {
                    out[row] = value;
                }
                out
            }
            None => values.to_owned(),
        }
    }
}

/// Check candidates against `X` without materializing them.
///
/// # Errors
///
/// - [`QueryError::IndexOutOfBounds`] for an index past the end of `X`.
/// - [`QueryError::FeatureMismatch`] when standalone features have a
///   different dimensionality than `X`.
pub fn check_candidates(x: ArrayView2<'_, f64>, candidates: &Candidates<'_>) -> Result<()> {
    match candidates {
        Candidates::Unlabeled => Ok(()),
        Candidates::Indices(indices) => {
            match indices.iter().find(|&&i| i >= x.nrows()) {
                Some(&index) => Err(QueryError::IndexOutOfBounds {
                    index,
                    n_samples: x.nrows(),
                }),
                None => Ok(()),
            }
        }
        Candidates::Features(features) => {
            if x.nrows() > 0 && features.nrows() > 0 && features.ncols() != x.ncols() {
                return Err(QueryError::FeatureMismatch {
                    x_features: x.ncols(),
                    candidate_features: features.ncols(),
                });
            }
            Ok(())
        }
    }
}

/// Resolve `candidates` into a feature matrix and an optional mapping into `X`.
///
/// # Example
///
/// ```
/// use alpool::candidates::{Candidates, resolve_candidates};
/// use alpool::labels::MissingLabel;
/// use ndarray::array;
///
/// let x = array![[0.0], [1.0], [2.0]];
/// let y = array![0.0, f64::NAN, f64::NAN];
/// let resolved = resolve_candidates(x.view(), y.view(), &Candidates::Unlabeled, MissingLabel::default()).unwrap();
/// assert_eq!(resolved.mapping, Some(vec![1, 2]));
/// assert_eq!(resolved.features, array![[1.0], [2.0]]);
/// ```
pub fn resolve_candidates(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    candidates: &Candidates<'_>,
    missing_label: MissingLabel,
) -> Result<ResolvedCandidates> {
    check_candidates(x, candidates)?;
    let resolved = match candidates {
        Candidates::Unlabeled => {
            let mapping = unlabeled_indices(y, missing_label);
            ResolvedCandidates {
                features: x.select(Axis(0), &mapping),
                mapping: Some(mapping),
            }
        }
        Candidates::Indices(indices) => ResolvedCandidates {
            features: x.select(Axis(0), indices),
            mapping: Some(indices.to_vec()),
        },
        Candidates::Features(features) => ResolvedCandidates {
            features: features.to_owned(),
            mapping: None,
        },
    };
    Ok(resolved)
}
