//! Parallel utility estimation around another strategy.
//!
//! The candidate pool is cut into contiguous chunks. For every chunk the
//! wrapped strategy is asked for the utilities of its first pick; chunks run
//! on a rayon pool and their utilities are merged in chunk order. The batch
//! is then formed from the merged utilities.
//!
//! The merged utilities equal the wrapped strategy's own utilities only if
//! each candidate's utility is independent of the other candidates.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Axis};

use super::{QueryRequest, QueryResult, QueryStrategy, check_wrapped_missing_label, select_batch};
use crate::candidates::{Candidates, resolve_candidates};
use crate::error::{QueryError, Result};
use crate::labels::MissingLabel;
use crate::options::QueryOptions;
use crate::utils::{Parallelism, run_with_threads, seeded_rng};

// =============================================================================
// ParallelBackend
// =============================================================================

/// Execution backend for [`ParallelUtilityEstimationWrapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelBackend {
    /// Dedicated rayon thread pool.
    #[default]
    Threads,
    /// Evaluate the chunks one after another on the calling thread.
    Sequential,
}

impl fmt::Display for ParallelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParallelBackend::Threads => f.write_str("threading"),
            ParallelBackend::Sequential => f.write_str("sequential"),
        }
    }
}

impl FromStr for ParallelBackend {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "threading" => Ok(ParallelBackend::Threads),
            "sequential" => Ok(ParallelBackend::Sequential),
            other => Err(QueryError::invalid_value(
                "backend",
                format!("must be \"threading\" or \"sequential\", got {other:?}"),
            )),
        }
    }
}

// =============================================================================
// ParallelUtilityEstimationWrapper
// =============================================================================

/// Evaluates a strategy's utilities on candidate chunks in parallel.
///
/// # Example
///
/// ```
/// use alpool::strategy::{CoreSet, ParallelUtilityEstimationWrapper, QueryRequest, QueryStrategy};
/// use ndarray::array;
///
/// let inner = CoreSet::builder().build().unwrap();
/// let wrapper = ParallelUtilityEstimationWrapper::new(inner).with_n_jobs(2).unwrap();
/// let x = array![[0.0], [1.0], [3.0], [7.0]];
/// let y = array![0.0, f64::NAN, f64::NAN, f64::NAN];
/// let result = wrapper.query(&QueryRequest::new(x.view(), y.view())).unwrap();
/// assert_eq!(result.indices, vec![3]);
/// ```
#[derive(Debug, Clone)]
pub struct ParallelUtilityEstimationWrapper<Q> {
    /// Strategy evaluated per chunk.
    pub inner: Q,
    /// Worker count; `-1` uses every core.
    pub n_jobs: isize,
    /// Execution backend.
    pub backend: ParallelBackend,
    /// Candidates per chunk. `None` splits evenly across workers.
    pub chunk_size: Option<usize>,
    /// Missing-label sentinel. Default: the wrapped strategy's.
    pub missing_label: MissingLabel,
    /// Seed for the final batch selection.
    pub seed: u64,
}

impl<Q: QueryStrategy> ParallelUtilityEstimationWrapper<Q> {
    pub fn new(inner: Q) -> Self {
        Self {
            missing_label: inner.missing_label(),
            inner,
            n_jobs: -1,
            backend: ParallelBackend::default(),
            chunk_size: None,
            seed: 0,
        }
    }

    /// # Errors
    ///
    /// [`QueryError::InvalidValue`] for `0` or anything below `-1`.
    pub fn with_n_jobs(mut self, n_jobs: isize) -> Result<Self> {
        check_n_jobs(n_jobs)?;
        self.n_jobs = n_jobs;
        Ok(self)
    }

    pub fn with_backend(mut self, backend: ParallelBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
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

    /// Apply `backend` and `chunk_size` from an option map.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidType`] for unknown keys or values of the wrong
    /// kind, [`QueryError::InvalidValue`] for an unknown backend name or a
    /// zero chunk size.
    pub fn with_parallel_options(mut self, options: &QueryOptions) -> Result<Self> {
        options.check_keys("parallel_options", &["backend", "chunk_size"])?;
        if let Some(backend) = options.get_str("backend")? {
            self.backend = backend.parse()?;
        }
        if let Some(chunk_size) = options.get_usize("chunk_size")? {
            self.chunk_size = Some(chunk_size);
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        check_n_jobs(self.n_jobs)?;
        if self.chunk_size == Some(0) {
            return Err(QueryError::invalid_value("chunk_size", "must be >= 1, got 0"));
        }
        check_wrapped_missing_label(self.missing_label, &self.inner)
    }

    fn n_threads(&self) -> usize {
        match self.backend {
            ParallelBackend::Sequential => 1,
            ParallelBackend::Threads if self.n_jobs < 0 => 0,
            ParallelBackend::Threads => self.n_jobs.unsigned_abs(),
        }
    }
}

fn check_n_jobs(n_jobs: isize) -> Result<()> {
    if n_jobs == 0 || n_jobs < -1 {
        return Err(QueryError::invalid_value(
            "n_jobs",
            format!("must be -1 or >= 1, got {n_jobs}"),
        ));
    }
    Ok(())
}

impl<Q: QueryStrategy> QueryStrategy for ParallelUtilityEstimationWrapper<Q> {
    fn query(&self, request: &QueryRequest<'_>) -> Result<QueryResult> {
        self.validate()?;
        request.validate(self.missing_label)?;

        let resolved = resolve_candidates(request.x, request.y, &request.candidates, self.missing_label)?;
        let n_candidates = resolved.n_candidates();
        let width = resolved.utility_width(request.x.nrows());
        let n_threads = self.n_threads();

        let chunk_size = self.chunk_size.unwrap_or_else(|| {
            let workers = if n_threads == 0 {
                rayon::current_num_threads()
            } else {
                n_threads
            };
            n_candidates.div_ceil(workers.max(1)).max(1)
        });
        let chunks: Vec<(usize, usize)> = (0..n_candidates)
            .step_by(chunk_size)
            .map(|start| (start, (start + chunk_size).min(n_candidates)))
            .collect();
        tracing::debug!(
            n_candidates,
            n_chunks = chunks.len(),
            n_threads,
            backend = %self.backend,
            "parallel utility estimation"
        );

        let evaluate = |(start, end): (usize, usize)| -> Result<Array1<f64>> {
            let first_row = |result: QueryResult| {
                result
                    .utilities
                    .filter(|u| u.nrows() > 0)
                    .map(|u| u.index_axis(Axis(0), 0).to_owned())
            };
            match &resolved.mapping {
                Some(mapping) => {
                    let chunk = &mapping[start..end];
                    let inner = request
                        .reborrow()
                        .with_candidates(Candidates::Indices(chunk))
                        .with_batch_size(1)
                        .with_return_utilities(true);
                    let row = first_row(self.inner.query(&inner)?);
                    Ok(Array1::from_iter(chunk.iter().map(|&i| {
                        row.as_ref().map_or(f64::NAN, |r| r[i])
                    })))
                }
                None => {
                    let features = resolved.features.slice(ndarray::s![start..end, ..]);
                    let inner = request
                        .reborrow()
                        .with_candidates(Candidates::Features(features))
                        .with_batch_size(1)
                        .with_return_utilities(true);
                    let row = first_row(self.inner.query(&inner)?);
                    Ok(row.unwrap_or_else(|| Array1::from_elem(end - start, f64::NAN)))
                }
            }
        };

        let partials = run_with_threads(n_threads, |parallelism: Parallelism| {
            parallelism.maybe_par_map(chunks.clone(), evaluate)
        })?;

        // Merge in chunk order.
        let mut candidate_utilities = Array1::from_elem(n_candidates, f64::NAN);
        for (&(start, end), partial) in chunks.iter().zip(partials) {
            candidate_utilities
                .slice_mut(ndarray::s![start..end])
                .assign(&partial?);
        }

        let utilities = resolved.scatter(candidate_utilities.view(), width);
        let mut rng = seeded_rng(self.seed);
        select_batch(utilities, request.batch_size, request.return_utilities, &mut rng)
    }

    fn missing_label(&self) -> MissingLabel {
        self.missing_label
    }
}
