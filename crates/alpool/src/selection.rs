//! Utility-based selection: randomized arg-max and greedy batch reduction.
//!
//! All functions take the random source explicitly. Given the same generator
//! state they produce the same result, which is what makes every query
//! strategy reproducible from its seed.
//!
//! `NaN` marks ineligible positions everywhere: it is skipped by
//! [`rand_argmax`] / [`rand_argmin`] and written by [`simple_batch`] to
//! positions that were already selected.

use ndarray::{Array, ArrayView, Axis, Dimension, IxDyn, NdIndex, RemoveAxis};
use rand::Rng;

use crate::error::{QueryError, Result};
use crate::validation::check_batch_size;

// =============================================================================
// Arg-max / Arg-min
// =============================================================================

/// Multi-index of the maximum non-`NaN` value, ties broken uniformly at random.
///
/// For 1-D input the pattern is a plain `usize`; for 2-D a `(usize, usize)`,
/// and so on.
///
/// # Errors
///
/// [`QueryError::NoValidUtility`] if every entry is `NaN` (or the array is empty).
///
/// # Example
///
/// ```
/// use alpool::selection::rand_argmax;
/// use ndarray::array;
/// use rand::SeedableRng;
/// use rand_xoshiro::Xoshiro256PlusPlus;
///
/// let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
/// let utilities = array![0.2, f64::NAN, 0.9, 0.1];
/// assert_eq!(rand_argmax(utilities.view(), &mut rng).unwrap(), 2);
/// ```
pub fn rand_argmax<D, R>(utilities: ArrayView<'_, f64, D>, rng: &mut R) -> Result<D::Pattern>
where
    D: Dimension,
    R: Rng + ?Sized,
{
    select_extreme(utilities, rng, |candidate, best| candidate > best)
}

/// Multi-index of the minimum non-`NaN` value, ties broken uniformly at random.
///
/// # Errors
///
/// [`QueryError::NoValidUtility`] if every entry is `NaN`.
pub fn rand_argmin<D, R>(utilities: ArrayView<'_, f64, D>, rng: &mut R) -> Result<D::Pattern>
where
    D: Dimension,
    R: Rng + ?Sized,
{
    select_extreme(utilities, rng, |candidate, best| candidate < best)
}

fn select_extreme<D, R>(
    utilities: ArrayView<'_, f64, D>,
    rng: &mut R,
    better: impl Fn(f64, f64) -> bool,
) -> Result<D::Pattern>
where
    D: Dimension,
    R: Rng + ?Sized,
{
    let mut best = f64::NAN;
    let mut ties: Vec<D::Pattern> = Vec::new();

    for (idx, &value) in utilities.indexed_iter() {
        if value.is_nan() {
            continue;
        }
        if ties.is_empty() || better(value, best) {
            best = value;
            ties.clear();
            ties.push(idx);
        } else if value == best {
            ties.push(idx);
        }
    }

    match ties.len() {
        0 => Err(QueryError::NoValidUtility),
        1 => Ok(ties.swap_remove(0)),
        n => Ok(ties.swap_remove(rng.gen_range(0..n))),
    }
}

// =============================================================================
// Batch Reduction
// =============================================================================

/// Greedily select `batch_size` positions from a one-shot utility array.
///
/// Repeats: pick the arg-max (random tie-break), snapshot the current
/// utilities into the history, then set the picked position to `NaN` so it
/// cannot be chosen again.
///
/// If fewer than `batch_size` entries are non-`NaN`, a warning is logged and
/// the batch shrinks to the number of available entries.
///
/// # Returns
///
/// `(indices, history)` where `indices[i]` is the `i`-th pick (most preferred
/// first) and `history` has shape `(returned_batch_size, *utilities.shape())`;
/// `history[i]` holds the utilities used to make pick `i`.
///
/// # Errors
///
/// [`QueryError::InvalidValue`] if `batch_size == 0`.
///
/// # Example
///
/// ```
/// use alpool::selection::simple_batch;
/// use ndarray::array;
/// use rand::SeedableRng;
/// use rand_xoshiro::Xoshiro256PlusPlus;
///
/// let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
/// let utilities = array![0.5, 0.1, 0.9, f64::NAN];
/// let (indices, history) = simple_batch(utilities.view(), 2, &mut rng).unwrap();
/// assert_eq!(indices, vec![2, 0]);
/// assert_eq!(history.dim(), (2, 4));
/// assert!(history[[1, 2]].is_nan());
/// ```
pub fn simple_batch<D, R>(
    utilities: ArrayView<'_, f64, D>,
    batch_size: usize,
    rng: &mut R,
) -> Result<(Vec<D::Pattern>, Array<f64, D::Larger>)>
where
    D: Dimension,
    D::Pattern: NdIndex<D>,
    D::Larger: RemoveAxis,
    R: Rng + ?Sized,
{
    check_batch_size(batch_size)?;

    let n_valid = utilities.iter().filter(|u| !u.is_nan()).count();
    let batch_size = if n_valid < batch_size {
        tracing::warn!(
            requested = batch_size,
            available = n_valid,
            "batch_size is larger than the number of candidates; shrinking the batch"
        );
        n_valid
    } else {
        batch_size
    };

    let mut shape = Vec::with_capacity(utilities.ndim() + 1);
    shape.push(batch_size);
    shape.extend_from_slice(utilities.shape());
    let mut history = Array::from_elem(IxDyn(&shape), f64::NAN)
        .into_dimensionality::<D::Larger>()
        .map_err(|e| QueryError::invalid_value("utilities", e.to_string()))?;

    let mut current = utilities.to_owned();
    let mut indices = Vec::with_capacity(batch_size);
    for i in 0..batch_size {
        let best = rand_argmax(current.view(), rng)?;
        history.index_axis_mut(Axis(0), i).assign(&current);
        current[best.clone()] = f64::NAN;
        indices.push(best);
    }

    Ok((indices, history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::collections::HashSet;

    fn rng(seed: u64) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(seed)
    }

    #[test]
    fn argmax_skips_nan() {
        let u = array![f64::NAN, 1.0, f64::NAN, 3.0];
        assert_eq!(rand_argmax(u.view(), &mut rng(0)).unwrap(), 3);
    }

    #[test]
    fn argmax_handles_negative_infinity() {
        let u = array![f64::NEG_INFINITY, f64::NAN];
        assert_eq!(rand_argmax(u.view(), &mut rng(0)).unwrap(), 0);
    }

    #[test]
    fn argmin_picks_minimum() {
        let u = array![2.0, -1.0, f64::NAN, 0.0];
        assert_eq!(rand_argmin(u.view(), &mut rng(0)).unwrap(), 1);
    }

    #[test]
    fn all_nan_is_error() {
        let u = array![f64::NAN, f64::NAN];
        assert_eq!(rand_argmax(u.view(), &mut rng(0)), Err(QueryError::NoValidUtility));
        let empty = Array1::<f64>::zeros(0);
        assert_eq!(rand_argmax(empty.view(), &mut rng(0)), Err(QueryError::NoValidUtility));
    }

    #[test]
    fn ties_are_reproducible_per_seed() {
        let u = Array1::from_elem(100, 1.0);
        let a = rand_argmax(u.view(), &mut rng(7)).unwrap();
        let b = rand_argmax(u.view(), &mut rng(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_break_ties_differently() {
        let u = Array1::from_elem(100, 1.0);
        let picks: HashSet<usize> = (0..10)
            .map(|seed| rand_argmax(u.view(), &mut rng(seed)).unwrap())
            .collect();
        assert!(picks.len() > 1);
    }

    #[test]
    fn argmax_returns_multi_index_for_2d() {
        let u = array![[0.0, 1.0], [5.0, f64::NAN]];
        assert_eq!(rand_argmax(u.view(), &mut rng(0)).unwrap(), (1, 0));
    }

    #[test]
    fn batch_marks_selected_as_nan() {
        let u = array![0.3, 0.9, 0.5, 0.1];
        let (indices, history) = simple_batch(u.view(), 3, &mut rng(0)).unwrap();
        assert_eq!(indices, vec![1, 2, 0]);
        assert_eq!(history.dim(), (3, 4));
        assert_eq!(history[[0, 1]], 0.9);
        assert!(history[[1, 1]].is_nan());
        assert!(history[[2, 1]].is_nan() && history[[2, 2]].is_nan());
        assert_eq!(history[[2, 0]], 0.3);
    }

    #[test]
    fn batch_clips_to_available() {
        let u = array![1.0, f64::NAN, 2.0];
        let (indices, history) = simple_batch(u.view(), 5, &mut rng(0)).unwrap();
        assert_eq!(indices, vec![2, 0]);
        assert_eq!(history.dim(), (2, 3));
    }

    #[test]
    fn batch_of_all_nan_is_empty() {
        let u = array![f64::NAN, f64::NAN];
        let (indices, history) = simple_batch(u.view(), 1, &mut rng(0)).unwrap();
        assert!(indices.is_empty());
        assert_eq!(history.dim(), (0, 2));
    }

    #[test]
    fn batch_size_zero_rejected() {
        let u = array![1.0];
        assert!(simple_batch(u.view(), 0, &mut rng(0)).is_err());
    }

    #[test]
    fn batch_over_2d_utilities() {
        let u = array![[0.1, 0.4], [0.3, 0.2]];
        let (indices, history) = simple_batch(u.view(), 2, &mut rng(0)).unwrap();
        assert_eq!(indices, vec![(0, 1), (1, 0)]);
        assert_eq!(history.shape(), &[2, 2, 2]);
        assert!(history[[1, 0, 1]].is_nan());
    }

    #[test]
    fn input_is_not_modified() {
        let u = array![0.3, 0.9];
        let _ = simple_batch(u.view(), 2, &mut rng(0)).unwrap();
        assert_eq!(u, array![0.3, 0.9]);
    }
}
