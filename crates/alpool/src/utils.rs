//! Shared helpers: per-query random generators, Euclidean distances and the
//! rayon plumbing used by the parallel utility wrapper.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use crate::error::{QueryError, Result};

// =============================================================================
// Randomness
// =============================================================================

/// Generator used by every strategy.
pub type StrategyRng = Xoshiro256PlusPlus;

/// Fresh generator for one query call.
#[inline]
pub fn seeded_rng(seed: u64) -> StrategyRng {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

// =============================================================================
// Distances
// =============================================================================

/// Squared Euclidean distance between two vectors.
#[inline]
pub fn squared_euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Euclidean distance between two vectors.
#[inline]
pub fn euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    squared_euclidean(a, b).sqrt()
}

/// Pairwise Euclidean distances, shape `(a.nrows(), b.nrows())`.
pub fn pairwise_euclidean(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.nrows(), b.nrows()), |(i, j)| euclidean(a.row(i), b.row(j)))
}

/// Distance from each row of `points` to its nearest row in `reference`.
///
/// Returns `+inf` for every point when `reference` is empty.
pub fn min_distances(points: ArrayView2<'_, f64>, reference: ArrayView2<'_, f64>) -> Array1<f64> {
    Array1::from_iter(points.rows().into_iter().map(|p| {
        reference
            .rows()
            .into_iter()
            .map(|r| euclidean(p, r))
            .fold(f64::INFINITY, f64::min)
    }))
}

// =============================================================================
// Parallelism
// =============================================================================

/// Execution mode handed to work that may fan out over rayon.
///
/// The pool is installed by [`run_with_threads`]; this flag only decides
/// between `par_iter` and a plain loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// `1` is sequential, `0` follows the size of the current rayon pool,
    /// anything larger is parallel.
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Whether work may be split across threads.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map over `iter`, in parallel when allowed. Output order matches input order.
    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run `f` inside a dedicated rayon pool of `n_threads` workers.
///
/// `0` sizes the pool to the machine and `1` runs `f` on the calling thread
/// without building a pool.
///
/// # Errors
///
/// [`QueryError::ThreadPool`] if the pool cannot be created.
///
/// # Example
///
/// ```
/// use alpool::utils::run_with_threads;
///
/// let n = run_with_threads(2, |_| rayon::current_num_threads()).unwrap();
/// assert_eq!(n, 2);
/// ```
#[inline]
pub fn run_with_threads<T: Send>(
    n_threads: usize,
    f: impl FnOnce(Parallelism) -> T + Send,
) -> Result<T> {
    match Parallelism::from_threads(n_threads) {
        Parallelism::Sequential => Ok(f(Parallelism::Sequential)),
        Parallelism::Parallel => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()
                .map_err(|e| QueryError::ThreadPool(e.to_string()))?;
            Ok(pool.install(|| f(Parallelism::Parallel)))
        }
    }
}
