//! End-to-end behaviour of the Core-Set strategy.

use alpool::candidates::Candidates;
use alpool::strategy::{CoreSet, QueryRequest, QueryStrategy, k_greedy_center};
use alpool::testing::line_points;
use alpool::utils::seeded_rng;
use alpool::{ErrorKind, MissingLabel};
use ndarray::{Array1, Array2, array};

/// Ten points on a diagonal line; the first two are labeled.
fn line_pool() -> (Array2<f64>, Array1<f64>) {
    let x = Array1::linspace(0.0, 1.0, 20)
        .into_shape_with_order((10, 2))
        .unwrap();
    let mut y = Array1::from_elem(10, f64::NAN);
    y[0] = 0.0;
    y[1] = 1.0;
    (x, y)
}

fn strategy(seed: u64) -> CoreSet {
    CoreSet::builder().seed(seed).build().unwrap()
}

#[test]
fn line_pool_covers_both_ends() {
    let (x, y) = line_pool();
    let request = QueryRequest::new(x.view(), y.view())
        .with_batch_size(2)
        .with_return_utilities(true);
    let result = strategy(42).query(&request).unwrap();

    // The far end first, then the point halfway between it and the labels.
    assert_eq!(result.indices, vec![9, 5]);
    let utilities = result.utilities.unwrap();
    assert_eq!(utilities.dim(), (2, 10));
    assert!(utilities[[0, 0]].is_nan());
    assert!(utilities[[0, 1]].is_nan());
    assert!(utilities[[1, 9]].is_nan());
}

#[test]
fn identical_calls_are_deterministic() {
    let (x, y) = line_pool();
    let request = QueryRequest::new(x.view(), y.view())
        .with_batch_size(4)
        .with_return_utilities(true);
    let a = strategy(42).query(&request).unwrap();
    let b = strategy(42).query(&request).unwrap();
    assert_eq!(a.indices, b.indices);
}

#[test]
fn duplicate_points_give_zero_utilities() {
    let x = Array2::<f64>::ones((10, 2));
    let mut y = Array1::from_elem(10, f64::NAN);
    y[0] = 0.0;
    y[1] = 1.0;
    let result = strategy(0)
        .query(
            &QueryRequest::new(x.view(), y.view())
                .with_batch_size(3)
                .with_return_utilities(true),
        )
        .unwrap();

    assert_eq!(result.len(), 3);
    let mut seen = result.indices.clone();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 3);
    assert!(result.indices.iter().all(|&i| i >= 2));
    for &u in result.utilities.unwrap().iter() {
        assert!(u.is_nan() || u == 0.0);
    }
}

#[test]
fn utilities_are_non_negative_or_nan() {
    let x = alpool::testing::random_features(30, 3, 7, -1.0, 1.0);
    let y = alpool::testing::hide_labels(&Array1::zeros(30), 5, f64::NAN, 3);
    let result = strategy(1)
        .query(
            &QueryRequest::new(x.view(), y.view())
                .with_batch_size(5)
                .with_return_utilities(true),
        )
        .unwrap();
    for &u in result.utilities.unwrap().iter() {
        assert!(u.is_nan() || u >= 0.0);
    }
}

#[test]
fn candidate_indices_restrict_the_pool() {
    let (x, y) = line_pool();
    let idx = [2, 3, 4];
    let result = strategy(0)
        .query(
            &QueryRequest::new(x.view(), y.view())
                .with_candidates(Candidates::Indices(&idx))
                .with_return_utilities(true),
        )
        .unwrap();
    assert_eq!(result.indices, vec![4]);
    let utilities = result.utilities.unwrap();
    assert_eq!(utilities.ncols(), 10);
    assert!(utilities[[0, 9]].is_nan());
}

#[test]
fn raw_candidates_have_their_own_width() {
    let (x, y) = line_pool();
    let cand = line_points(5);
    let result = strategy(0)
        .query(
            &QueryRequest::new(x.view(), y.view())
                .with_candidates(Candidates::Features(cand.view()))
                .with_batch_size(2)
                .with_return_utilities(true),
        )
        .unwrap();
    assert!(result.indices.iter().all(|&i| i < 5));
    assert_eq!(result.utilities.unwrap().dim(), (2, 5));
}

#[test]
fn raw_candidates_of_wrong_width_are_rejected() {
    let (x, y) = line_pool();
    let cand = array![[0.0, 0.0, 0.0]];
    let err = strategy(0)
        .query(&QueryRequest::new(x.view(), y.view()).with_candidates(Candidates::Features(cand.view())))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn greedy_center_respects_new_candidate_offset() {
    let x = array![[0.0], [1.0], [5.0], [2.0]];
    let y = array![0.0, 1.0, f64::NAN, f64::NAN];
    let mapping = [2, 3];
    let (indices, utilities) = k_greedy_center(
        x.view(),
        y.view(),
        1,
        &mut seeded_rng(0),
        MissingLabel::default(),
        Some(&mapping),
        Some(2),
    )
    .unwrap();
    assert_eq!(indices, vec![0]);
    assert_eq!(utilities.dim(), (1, 2));
    assert_eq!(utilities[[0, 0]], 4.0);
    assert_eq!(utilities[[0, 1]], 1.0);
}
