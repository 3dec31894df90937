//! Clustering back-ends for cluster-based strategies.
//!
//! [`TypiClust`](crate::strategy::TypiClust) only needs a hard partition of
//! `X` into a requested number of clusters, so the seam is a single trait.
//! [`KMeans`] is the default implementation.

mod kmeans;

pub use kmeans::{KMeans, KMeansFit};

use ndarray::ArrayView2;

use crate::error::Result;

/// Partitions samples into a fixed number of clusters.
pub trait Clusterer: Send + Sync {
    /// Cluster id in `0..n_clusters` for every row of `x`.
    ///
    /// Must be deterministic for a fixed `seed`.
    fn fit_predict(&self, x: ArrayView2<'_, f64>, n_clusters: usize, seed: u64) -> Result<Vec<usize>>;
}
