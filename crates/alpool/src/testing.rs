//! Seeded synthetic datasets for tests, doc examples and benchmarks.

use ndarray::{Array1, Array2};
use rand::prelude::*;

/// `n` two-dimensional points evenly spaced on the segment from `(0, 0)` to `(1, 1)`.
pub fn line_points(n: usize) -> Array2<f64> {
    let step = if n > 1 { 1.0 / (n - 1) as f64 } else { 0.0 };
    Array2::from_shape_fn((n, 2), |(i, _)| i as f64 * step)
}

/// Random features, uniform in `[min, max]`.
pub fn random_features(rows: usize, cols: usize, seed: u64, min: f64, max: f64) -> Array2<f64> {
    assert!(max >= min);
    let mut rng = StdRng::seed_from_u64(seed);
    let width = max - min;
    Array2::from_shape_simple_fn((rows, cols), || min + rng.r#gen::<f64>() * width)
}

/// Gaussian-ish blobs around `centers`, `n_per_class` points each.
///
/// Class `c` is labeled `c as f64`. Noise is uniform in `[-spread, spread]`
/// per coordinate.
pub fn blobs(centers: &[[f64; 2]], n_per_class: usize, spread: f64, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = centers.len() * n_per_class;
    let mut x = Array2::zeros((n, 2));
    let mut y = Array1::zeros(n);
    for (c, center) in centers.iter().enumerate() {
        for i in 0..n_per_class {
            let row = c * n_per_class + i;
            for d in 0..2 {
                x[[row, d]] = center[d] + (rng.r#gen::<f64>() * 2.0 - 1.0) * spread;
            }
            y[row] = c as f64;
        }
    }
    (x, y)
}

/// Copy of `y` where all but `n_labeled` randomly chosen entries are `missing`.
pub fn hide_labels(y: &Array1<f64>, n_labeled: usize, missing: f64, seed: u64) -> Array1<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut idx: Vec<usize> = (0..y.len()).collect();
    idx.shuffle(&mut rng);
    let mut out = Array1::from_elem(y.len(), missing);
    for &i in idx.iter().take(n_labeled) {
        out[i] = y[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_spans_unit_diagonal() {
        let x = line_points(20);
        assert_eq!(x.dim(), (20, 2));
        assert_eq!(x[[0, 0]], 0.0);
        assert!((x[[19, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn hide_labels_keeps_requested_count() {
        let (_, y) = blobs(&[[0.0, 0.0], [5.0, 5.0]], 10, 0.5, 0);
        let partial = hide_labels(&y, 4, f64::NAN, 1);
        assert_eq!(partial.iter().filter(|v| !v.is_nan()).count(), 4);
    }

    #[test]
    fn generators_are_seeded() {
        assert_eq!(random_features(3, 2, 7, 0.0, 1.0), random_features(3, 2, 7, 0.0, 1.0));
    }
}
