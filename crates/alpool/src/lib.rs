//! alpool: pool-based active learning query strategies for Rust.
//!
//! Given a partially labeled pool `(X, y)`, a query strategy decides which
//! unlabeled samples should be sent to an oracle next. Missing labels are
//! marked with a sentinel (`NaN` by default, see [`labels::MissingLabel`]).
//!
//! # Key Types
//!
//! - [`QueryStrategy`] / [`QueryRequest`] / [`QueryResult`] - The query contract
//! - [`Candidates`] - Which samples may be selected
//! - [`ExpectedErrorReduction`], [`CoreSet`], [`QueryByCommittee`],
//!   [`TypiClust`], [`McPal`] - Strategies
//! - [`SubSamplingWrapper`], [`ParallelUtilityEstimationWrapper`] - Wrappers
//! - [`model`] - Model traits and a reference Parzen window classifier
//!
//! # Example
//!
//! ```
//! use alpool::{CoreSet, QueryRequest, QueryStrategy};
//! use ndarray::array;
//!
//! let x = array![[0.0, 0.0], [0.1, 0.1], [3.0, 3.0], [0.2, 0.0]];
//! let y = array![0.0, f64::NAN, f64::NAN, f64::NAN];
//!
//! let strategy = CoreSet::builder().seed(42).build().unwrap();
//! let result = strategy
//!     .query(&QueryRequest::new(x.view(), y.view()).with_batch_size(2))
//!     .unwrap();
//! assert_eq!(result.indices[0], 2);
//! ```
//!
//! # Randomness
//!
//! Every strategy owns a seed and creates a fresh generator per call, so
//! identical calls return identical results. Ties are broken at random.
//!
//! # Logging
//!
//! Recoverable conditions (a batch larger than the candidate pool, more
//! sub-sampled candidates than available) are reported through `tracing`
//! and clipped. The crate installs no subscriber.

pub mod candidates;
pub mod cluster;
pub mod error;
pub mod labels;
pub mod model;
pub mod options;
pub mod selection;
pub mod strategy;
pub mod testing;
pub mod utils;
pub mod validation;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Query contract
pub use strategy::{QueryRequest, QueryResult, QueryStrategy};

// Strategies and wrappers
pub use strategy::{
    CoreSet, ExpectedErrorReduction, McPal, ParallelUtilityEstimationWrapper, QueryByCommittee,
    SubSamplingWrapper, TypiClust,
};

// Candidates, options and errors
pub use candidates::{Candidates, ResolvedCandidates, resolve_candidates};
pub use error::{ErrorKind, ModelError, QueryError};
pub use labels::{MISSING_LABEL, MissingLabel};
pub use options::{OptionValue, QueryOptions};

// Selection
pub use selection::{rand_argmax, rand_argmin, simple_batch};

// Shared utilities
pub use utils::{Parallelism, run_with_threads};
