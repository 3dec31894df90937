//! K-means clustering (k-means++ initialization, Lloyd iterations).

use bon::Builder;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use super::Clusterer;
use crate::error::{QueryError, Result};
use crate::utils::{seeded_rng, squared_euclidean};

/// K-means configuration.
///
/// # Example
///
/// ```
/// use alpool::cluster::KMeans;
/// use ndarray::array;
///
/// let x = array![[0.0], [0.1], [10.0], [10.1]];
/// let fit = KMeans::builder().build().unwrap().fit(x.view(), 2, 0).unwrap();
/// assert_eq!(fit.labels[0], fit.labels[1]);
/// assert_ne!(fit.labels[0], fit.labels[2]);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct KMeans {
    /// Maximum number of Lloyd iterations. Default: 300.
    #[builder(default = 300)]
    pub max_iter: usize,

    /// Stop once no centre moves further than this. Default: 1e-4.
    #[builder(default = 1e-4)]
    pub tol: f64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            max_iter: 300,
            tol: 1e-4,
        }
    }
}

impl<S: k_means_builder::IsComplete> KMeansBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidValue`] if `max_iter == 0` or `tol` is negative.
    pub fn build(self) -> Result<KMeans> {
        let kmeans = self.__build_internal();
        kmeans.validate()?;
        Ok(kmeans)
    }
}

/// Result of a k-means fit.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// Cluster centres, shape `(n_clusters, n_features)`.
    pub centers: Array2<f64>,
    /// Cluster id per sample.
    pub labels: Vec<usize>,
    /// Lloyd iterations performed.
    pub n_iter: usize,
}

impl KMeans {
    fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(QueryError::invalid_value("max_iter", "must be >= 1, got 0"));
        }
        if !(self.tol >= 0.0) {
            return Err(QueryError::invalid_value(
                "tol",
                format!("must be >= 0, got {}", self.tol),
            ));
        }
        Ok(())
    }

    /// Cluster `x` into `n_clusters` groups.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidValue`] if `n_clusters` is outside `1..=n_samples`.
    pub fn fit(&self, x: ArrayView2<'_, f64>, n_clusters: usize, seed: u64) -> Result<KMeansFit> {
        self.validate()?;
        let n_samples = x.nrows();
        if n_clusters == 0 || n_clusters > n_samples {
            return Err(QueryError::invalid_value(
                "n_clusters",
                format!("must be in 1..={n_samples}, got {n_clusters}"),
            ));
        }

        let mut rng = seeded_rng(seed);
        let mut centers = init_plus_plus(x, n_clusters, &mut rng)?;
        let mut labels = assign(x, centers.view());
        let mut n_iter = 0;

        while n_iter < self.max_iter {
            n_iter += 1;
            let updated = update_centers(x, &labels, centers.view());
            let shift = centers
                .rows()
                .into_iter()
                .zip(updated.rows())
                .map(|(a, b)| squared_euclidean(a, b).sqrt())
                .fold(0.0, f64::max);
            centers = updated;
            labels = assign(x, centers.view());
            if shift <= self.tol {
                break;
            }
        }

        tracing::trace!(n_clusters, n_iter, "k-means converged");
        Ok(KMeansFit {
            centers,
            labels,
            n_iter,
        })
    }
}

impl Clusterer for KMeans {
    fn fit_predict(&self, x: ArrayView2<'_, f64>, n_clusters: usize, seed: u64) -> Result<Vec<usize>> {
        Ok(self.fit(x, n_clusters, seed)?.labels)
    }
}

// =============================================================================
// Lloyd steps
// =============================================================================

/// k-means++ seeding: each new centre is drawn with probability proportional
/// to its squared distance from the nearest existing centre.
fn init_plus_plus<R: Rng + ?Sized>(
    x: ArrayView2<'_, f64>,
    n_clusters: usize,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let n_samples = x.nrows();
    let mut chosen = Vec::with_capacity(n_clusters);
    chosen.push(rng.gen_range(0..n_samples));

    let mut closest: Array1<f64> = x
        .rows()
        .into_iter()
        .map(|row| squared_euclidean(row, x.row(chosen[0])))
        .collect();

    while chosen.len() < n_clusters {
        let next = if closest.sum() > 0.0 {
            let dist = WeightedIndex::new(closest.iter())
                .map_err(|e| QueryError::invalid_value("x", e.to_string()))?;
            dist.sample(rng)
        } else {
            rng.gen_range(0..n_samples)
        };
        chosen.push(next);
        let center = x.row(next);
        for (d, row) in closest.iter_mut().zip(x.rows()) {
            *d = d.min(squared_euclidean(row, center));
        }
    }

    Ok(x.select(Axis(0), &chosen))
}

fn nearest(sample: ArrayView1<'_, f64>, centers: ArrayView2<'_, f64>) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (k, center) in centers.rows().into_iter().enumerate() {
        let d = squared_euclidean(sample, center);
        if d < best_dist {
            best = k;
            best_dist = d;
        }
    }
    best
}

fn assign(x: ArrayView2<'_, f64>, centers: ArrayView2<'_, f64>) -> Vec<usize> {
    x.rows().into_iter().map(|row| nearest(row, centers)).collect()
}

/// Mean of each cluster; empty clusters keep their previous centre.
fn update_centers(x: ArrayView2<'_, f64>, labels: &[usize], previous: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(previous.raw_dim());
    let mut counts = vec![0usize; previous.nrows()];
    for (row, &k) in x.rows().into_iter().zip(labels) {
        let mut target = sums.row_mut(k);
        target += &row;
        counts[k] += 1;
    }
    for (k, mut row) in sums.rows_mut().into_iter().enumerate() {
        if counts[k] == 0 {
            row.assign(&previous.row(k));
        } else {
            row /= counts[k] as f64;
        }
    }
    sums
}
