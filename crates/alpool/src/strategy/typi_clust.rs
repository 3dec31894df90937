//! TypiClust: typical samples from uncovered clusters.
//!
//! `X` is clustered into `n_labeled + batch_size` clusters. Clusters that
//! already hold a labeled sample are covered. Each step selects the largest
//! uncovered cluster and queries its most typical candidate, where
//! typicality is the inverse mean distance to the `k` nearest neighbours
//! inside the cluster.

use ndarray::{Array1, ArrayView2, Axis};

use super::{QueryRequest, QueryResult, QueryStrategy, result_from_rows};
use crate::candidates::resolve_candidates;
use crate::cluster::{Clusterer, KMeans};
use crate::error::{QueryError, Result};
use crate::labels::{MissingLabel, labeled_indices};
use crate::selection::rand_argmax;
use crate::utils::{pairwise_euclidean, seeded_rng};

/// TypiClust query strategy.
///
/// # Example
///
/// ```
/// use alpool::strategy::{QueryRequest, QueryStrategy, TypiClust};
/// use ndarray::array;
///
/// let typi = TypiClust::new().with_k(1).unwrap();
/// let x = array![[0.0], [0.1], [0.2], [9.0]];
/// let y = array![f64::NAN, f64::NAN, f64::NAN, 1.0];
/// let result = typi.query(&QueryRequest::new(x.view(), y.view())).unwrap();
/// assert!(result.indices[0] < 3);
/// ```
#[derive(Debug, Clone)]
pub struct TypiClust<K = KMeans> {
    /// Neighbours used for typicality. Default: 5.
    pub k: usize,
    /// Clustering back-end.
    pub clusterer: K,
    /// Missing-label sentinel. Default: `NaN`.
    pub missing_label: MissingLabel,
    /// Seed for clustering and tie-breaking.
    pub seed: u64,
}

impl TypiClust<KMeans> {
    /// TypiClust with k-means clustering.
    pub fn new() -> Self {
        Self {
            k: 5,
            clusterer: KMeans::default(),
            missing_label: MissingLabel::default(),
            seed: 0,
        }
    }
}

impl Default for TypiClust<KMeans> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clusterer> TypiClust<K> {
    /// Replace the clustering back-end.
    pub fn with_clusterer<K2: Clusterer>(self, clusterer: K2) -> TypiClust<K2> {
        TypiClust {
            k: self.k,
            clusterer,
            missing_label: self.missing_label,
            seed: self.seed,
        }
    }

    /// # Errors
    ///
    /// [`QueryError::InvalidValue`] if `k == 0`.
    pub fn with_k(mut self, k: usize) -> Result<Self> {
        self.k = k;
        self.validate()?;
        Ok(self)
    }

    pub fn with_missing_label(mut self, missing_label: MissingLabel) -> Self {
        self.missing_label = missing_label;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(QueryError::invalid_value("k", "must be >= 1, got 0"));
        }
        Ok(())
    }
}

impl<K: Clusterer> QueryStrategy for TypiClust<K> {
    fn query(&self, request: &QueryRequest<'_>) -> Result<QueryResult> {
        self.validate()?;
        request.validate(self.missing_label)?;

        let resolved = resolve_candidates(request.x, request.y, &request.candidates, self.missing_label)?;
        let mapping = resolved.require_mapping("TypiClust")?;
        let n_samples = request.x.nrows();

        let batch_size = if mapping.len() < request.batch_size {
            tracing::warn!(
                requested = request.batch_size,
                available = mapping.len(),
                "batch_size is larger than the number of candidates; shrinking the batch"
            );
            mapping.len()
        } else {
            request.batch_size
        };
        if batch_size == 0 {
            return Ok(result_from_rows(Vec::new(), Vec::new(), n_samples, request.return_utilities));
        }

        let labeled = labeled_indices(request.y, self.missing_label);
        let n_clusters = (labeled.len() + batch_size).min(n_samples);
        let cluster_labels = self.clusterer.fit_predict(request.x, n_clusters, self.seed)?;
        if let Some(&bad) = cluster_labels.iter().find(|&&c| c >= n_clusters) {
            return Err(QueryError::invalid_value(
                "clusterer",
                format!("returned cluster id {bad} for {n_clusters} clusters"),
            ));
        }
        tracing::debug!(n_clusters, n_labeled = labeled.len(), batch_size, "typiclust");

        let mut cluster_sizes = Array1::<f64>::zeros(n_clusters);
        for &c in &cluster_labels {
            cluster_sizes[c] += 1.0;
        }
        for &i in &labeled {
            cluster_sizes[cluster_labels[i]] = 0.0;
        }

        let mut rng = seeded_rng(self.seed);
        let mut selected = vec![false; n_samples];
        let mut indices = Vec::with_capacity(batch_size);
        let mut rows = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let cluster_id = rand_argmax(cluster_sizes.view(), &mut rng)?;
            let members: Vec<usize> = (0..n_samples)
                .filter(|&i| cluster_labels[i] == cluster_id)
                .collect();
            let typ = typicality(request.x, &members, self.k);

            let mut utilities = Array1::from_elem(n_samples, f64::NAN);
            for &i in mapping {
                if !selected[i] {
                    utilities[i] = typ[i];
                }
            }
            let idx = rand_argmax(utilities.view(), &mut rng)?;
            selected[idx] = true;
            cluster_sizes[cluster_id] = 0.0;
            indices.push(idx);
            rows.push(utilities);
        }

        Ok(result_from_rows(indices, rows, n_samples, request.return_utilities))
    }

    fn missing_label(&self) -> MissingLabel {
        self.missing_label
    }
}

/// Typicality of every row of `x`: `k' / sum of distances to the k'+1 nearest
/// members` for members of the cluster (the sample itself included, so
/// `k' = min(k, |members| - 1)`), `1` for a singleton cluster and `-inf` for
/// rows outside the cluster.
pub fn typicality(x: ArrayView2<'_, f64>, members: &[usize], k: usize) -> Array1<f64> {
    let mut typ = Array1::from_elem(x.nrows(), f64::NEG_INFINITY);
    if members.len() == 1 {
        typ[members[0]] = 1.0;
        return typ;
    }
    let k = k.min(members.len().saturating_sub(1));
    if k == 0 {
        return typ;
    }

    let points = x.select(Axis(0), members);
    let dist = pairwise_euclidean(points.view(), points.view());
    let mut row = Vec::with_capacity(members.len());
    for (&i, d) in members.iter().zip(dist.rows()) {
        row.clear();
        row.extend(d.iter().copied());
        row.sort_by(f64::total_cmp);
        let knn: f64 = row[..=k].iter().sum();
        typ[i] = k as f64 / knn;
    }
    typ
}
