//! Sub-sampling and parallel wrappers around real strategies.

use alpool::candidates::Candidates;
use alpool::model::ParzenWindowClassifier;
use alpool::labels::MissingLabel;
use alpool::strategy::{
    CoreSet, ExpectedErrorReduction, MaxCandidates, ParallelBackend,
    ParallelUtilityEstimationWrapper, QueryByCommittee, QueryRequest, QueryStrategy,
    SubSamplingWrapper,
};
use alpool::testing::{blobs, hide_labels};
use alpool::{ErrorKind, QueryOptions};
use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, array, s};
use rstest::rstest;

// =============================================================================
// Fixtures
// =============================================================================

fn pool() -> (Array2<f64>, Array1<f64>) {
    let (x, y) = blobs(&[[0.0, 0.0], [2.0, 2.0], [0.0, 3.0]], 10, 1.0, 21);
    let y = hide_labels(&y, 6, f64::NAN, 2);
    (x, y)
}

fn committee() -> QueryByCommittee<ParzenWindowClassifier> {
    let members = [0.3, 1.0, 3.0]
        .into_iter()
        .map(|gamma| {
            ParzenWindowClassifier::builder()
                .classes(vec![0.0, 1.0, 2.0])
                .gamma(gamma)
                .class_prior(0.5)
                .build()
                .unwrap()
        })
        .collect();
    QueryByCommittee::new(members).with_seed(9)
}

fn n_valid(row: ndarray::ArrayView1<'_, f64>) -> usize {
    row.iter().filter(|u| !u.is_nan()).count()
}

/// Element-wise equality treating `NaN == NaN`.
fn assert_same_utilities(a: &Array2<f64>, b: &Array2<f64>) {
    assert_eq!(a.dim(), b.dim());
    for (&u, &v) in a.iter().zip(b.iter()) {
        if u.is_nan() || v.is_nan() {
            assert!(u.is_nan() && v.is_nan(), "{u} vs {v}");
        } else {
            assert_abs_diff_eq!(u, v, epsilon = 1e-12);
        }
    }
}

// =============================================================================
// SubSamplingWrapper
// =============================================================================

#[test]
fn sub_sampling_limits_evaluated_candidates() {
    let (x, y) = pool();
    let wrapper = SubSamplingWrapper::new(committee())
        .with_max_candidates(MaxCandidates::Count(10))
        .with_seed(4);
    let result = wrapper
        .query(&QueryRequest::new(x.view(), y.view()).with_return_utilities(true))
        .unwrap();

    let utilities = result.utilities.unwrap();
    assert_eq!(utilities.ncols(), x.nrows());
    assert_eq!(n_valid(utilities.row(0)), 10);
    assert!(y[result.indices[0]].is_nan());
    assert!(!utilities[[0, result.indices[0]]].is_nan());
}

#[rstest]
#[case(MaxCandidates::Count(24), 24)]
#[case(MaxCandidates::Count(25), 24)]
#[case(MaxCandidates::Fraction(0.5), 12)]
#[case(MaxCandidates::Fraction(1.0), 24)]
fn sub_sample_size_is_clipped(#[case] max_candidates: MaxCandidates, #[case] expected: usize) {
    let (x, y) = pool();
    assert_eq!(y.iter().filter(|v| v.is_nan()).count(), 24);
    let wrapper = SubSamplingWrapper::new(committee()).with_max_candidates(max_candidates);
    let result = wrapper
        .query(&QueryRequest::new(x.view(), y.view()).with_return_utilities(true))
        .unwrap();
    assert_eq!(n_valid(result.utilities.unwrap().row(0)), expected);
}

#[test]
fn sub_sampling_maps_raw_candidates_back() {
    let (x, y) = pool();
    let cand = alpool::testing::random_features(8, 2, 1, -1.0, 4.0);
    let wrapper = SubSamplingWrapper::new(CoreSet::builder().build().unwrap())
        .with_max_candidates(MaxCandidates::Count(3))
        .with_seed(2);
    let result = wrapper
        .query(
            &QueryRequest::new(x.view(), y.view())
                .with_candidates(Candidates::Features(cand.view()))
                .with_batch_size(2)
                .with_return_utilities(true),
        )
        .unwrap();
    assert!(result.indices.iter().all(|&i| i < 8));
    let utilities = result.utilities.unwrap();
    assert_eq!(utilities.dim(), (2, 8));
    assert_eq!(n_valid(utilities.row(0)), 3);
}

#[test]
fn sub_sampling_forwards_options() {
    let (x, y) = pool();
    let wrapper = SubSamplingWrapper::new(committee()).with_max_candidates(MaxCandidates::Count(5));
    let opts = QueryOptions::new().with("fit_ensemble", 3i64);
    let err = wrapper
        .query(&QueryRequest::new(x.view(), y.view()).with_options(&opts))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn invalid_fraction_is_rejected_at_query_time() {
    let (x, y) = pool();
    let wrapper = SubSamplingWrapper::new(committee()).with_max_candidates(MaxCandidates::Fraction(1.5));
    let err = wrapper.query(&QueryRequest::new(x.view(), y.view())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn sub_sampling_clips_oversized_batch() {
    let (x, y) = pool();
    let wrapper = SubSamplingWrapper::new(committee())
        .with_max_candidates(MaxCandidates::Count(10))
        .with_seed(3);
    let result = wrapper
        .query(
            &QueryRequest::new(x.view(), y.view())
                .with_batch_size(11)
                .with_return_utilities(true),
        )
        .unwrap();

    assert_eq!(result.len(), 10);
    let mut seen = result.indices.clone();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 10);
    assert!(result.indices.iter().all(|&i| y[i].is_nan()));
    assert_eq!(result.utilities.unwrap().dim(), (10, x.nrows()));
}

#[test]
fn sub_sample_changes_as_labels_grow() {
    let x = alpool::testing::random_features(12, 2, 5, 0.0, 1.0);
    let cand = alpool::testing::random_features(30, 2, 6, 0.0, 1.0);
    // Default seed.
    let wrapper = SubSamplingWrapper::new(CoreSet::builder().build().unwrap())
        .with_max_candidates(MaxCandidates::Count(5));
    let drawn = |n_labeled: usize| -> Vec<usize> {
        let mut y = Array1::from_elem(x.nrows(), f64::NAN);
        y.slice_mut(s![..n_labeled]).fill(0.0);
        let result = wrapper
            .query(
                &QueryRequest::new(x.view(), y.view())
                    .with_candidates(Candidates::Features(cand.view()))
                    .with_return_utilities(true),
            )
            .unwrap();
        let utilities = result.utilities.unwrap();
        (0..cand.nrows())
            .filter(|&j| !utilities[[0, j]].is_nan())
            .collect()
    };

    let first_round = drawn(2);
    assert_eq!(first_round.len(), 5);
    assert_eq!(drawn(2), first_round);
    assert_ne!(drawn(4), first_round);
}

// =============================================================================
// ParallelUtilityEstimationWrapper
// =============================================================================

#[rstest]
#[case(ParallelBackend::Threads, Some(2), None)]
#[case(ParallelBackend::Threads, Some(4), Some(3))]
#[case(ParallelBackend::Sequential, None, Some(5))]
fn parallel_matches_inner_committee(
    #[case] backend: ParallelBackend,
    #[case] n_jobs: Option<isize>,
    #[case] chunk_size: Option<usize>,
) {
    let (x, y) = pool();
    let request = QueryRequest::new(x.view(), y.view()).with_return_utilities(true);
    let expected = committee().query(&request).unwrap();

    let mut wrapper = ParallelUtilityEstimationWrapper::new(committee())
        .with_backend(backend)
        .with_seed(9);
    if let Some(n_jobs) = n_jobs {
        wrapper = wrapper.with_n_jobs(n_jobs).unwrap();
    }
    if let Some(chunk_size) = chunk_size {
        wrapper = wrapper.with_chunk_size(chunk_size);
    }
    let result = wrapper.query(&request).unwrap();

    assert_eq!(result.indices, expected.indices);
    assert_same_utilities(&result.utilities.unwrap(), &expected.utilities.unwrap());
}

#[test]
fn parallel_matches_inner_core_set_on_indices() {
    let (x, y) = pool();
    let idx: Vec<usize> = (0..x.nrows()).filter(|&i| y[i].is_nan()).step_by(2).collect();
    let request = QueryRequest::new(x.view(), y.view())
        .with_candidates(Candidates::Indices(&idx))
        .with_return_utilities(true);
    let core_set = CoreSet::builder().seed(5).build().unwrap();
    let expected = core_set.query(&request).unwrap();

    let wrapper = ParallelUtilityEstimationWrapper::new(core_set)
        .with_n_jobs(3)
        .unwrap()
        .with_chunk_size(2)
        .with_seed(5);
    let result = wrapper.query(&request).unwrap();
    assert_eq!(result.indices, expected.indices);
    assert_same_utilities(&result.utilities.unwrap(), &expected.utilities.unwrap());
}

#[test]
fn parallel_handles_raw_candidates() {
    let (x, y) = pool();
    let cand = array![[0.0, 0.0], [20.0, 20.0], [1.0, 1.0]];
    let wrapper = ParallelUtilityEstimationWrapper::new(CoreSet::builder().build().unwrap())
        .with_n_jobs(2)
        .unwrap()
        .with_chunk_size(1);
    let result = wrapper
        .query(
            &QueryRequest::new(x.view(), y.view())
                .with_candidates(Candidates::Features(cand.view()))
                .with_return_utilities(true),
        )
        .unwrap();
    assert_eq!(result.indices, vec![1]);
    assert_eq!(result.utilities.unwrap().dim(), (1, 3));
}

#[rstest]
#[case(0)]
#[case(-2)]
#[case(-10)]
fn invalid_n_jobs(#[case] n_jobs: isize) {
    let err = ParallelUtilityEstimationWrapper::new(committee())
        .with_n_jobs(n_jobs)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[rstest]
#[case(QueryOptions::new().with("batch_size", 3i64), ErrorKind::Type)]
#[case(QueryOptions::new().with("backend", "loky"), ErrorKind::Value)]
#[case(QueryOptions::new().with("backend", 1i64), ErrorKind::Type)]
#[case(QueryOptions::new().with("chunk_size", 0i64), ErrorKind::Value)]
#[case(QueryOptions::new().with("chunk_size", -1i64), ErrorKind::Value)]
fn invalid_parallel_options(#[case] options: QueryOptions, #[case] kind: ErrorKind) {
    let err = ParallelUtilityEstimationWrapper::new(committee())
        .with_parallel_options(&options)
        .unwrap_err();
    assert_eq!(err.kind(), kind);
}

#[test]
fn valid_parallel_options() {
    let options = QueryOptions::new()
        .with("backend", "sequential")
        .with("chunk_size", 4i64);
    let wrapper = ParallelUtilityEstimationWrapper::new(committee())
        .with_parallel_options(&options)
        .unwrap();
    assert_eq!(wrapper.backend, ParallelBackend::Sequential);
    assert_eq!(wrapper.chunk_size, Some(4));
}

// =============================================================================
// Missing label
// =============================================================================

fn eer_minus_one() -> ExpectedErrorReduction<ParzenWindowClassifier> {
    let clf = ParzenWindowClassifier::builder()
        .classes(vec![0.0, 1.0, 2.0])
        .missing_label(MissingLabel::new(-1.0))
        .class_prior(0.5)
        .build()
        .unwrap();
    ExpectedErrorReduction::new(clf, vec![0.0, 1.0, 2.0]).with_seed(2)
}

fn minus_one_pool() -> (Array2<f64>, Array1<f64>) {
    let (x, y) = pool();
    (x, y.mapv(|v| if v.is_nan() { -1.0 } else { v }))
}

#[test]
fn wrappers_adopt_inner_missing_label() {
    let (x, y) = minus_one_pool();
    let request = QueryRequest::new(x.view(), y.view()).with_batch_size(2);

    let sub = SubSamplingWrapper::new(eer_minus_one()).with_max_candidates(MaxCandidates::Count(5));
    assert_eq!(sub.missing_label, MissingLabel::new(-1.0));
    let result = sub.query(&request).unwrap();
    assert_eq!(result.len(), 2);
    assert!(result.indices.iter().all(|&i| y[i] == -1.0));

    let par = ParallelUtilityEstimationWrapper::new(eer_minus_one())
        .with_n_jobs(2)
        .unwrap();
    assert_eq!(par.missing_label, MissingLabel::new(-1.0));
    let result = par.query(&request).unwrap();
    assert_eq!(result.len(), 2);
    assert!(result.indices.iter().all(|&i| y[i] == -1.0));
}

#[test]
fn conflicting_missing_label_is_rejected() {
    let (x, y) = minus_one_pool();
    let request = QueryRequest::new(x.view(), y.view());

    let sub = SubSamplingWrapper::new(eer_minus_one()).with_missing_label(MissingLabel::default());
    assert_eq!(sub.query(&request).unwrap_err().kind(), ErrorKind::Value);

    let par = ParallelUtilityEstimationWrapper::new(eer_minus_one()).with_missing_label(MissingLabel::default());
    assert_eq!(par.query(&request).unwrap_err().kind(), ErrorKind::Value);
}

// =============================================================================
// Composition
// =============================================================================

#[test]
fn wrappers_compose() {
    let (x, y) = pool();
    let wrapper = SubSamplingWrapper::new(
        ParallelUtilityEstimationWrapper::new(committee())
            .with_n_jobs(2)
            .unwrap(),
    )
    .with_max_candidates(MaxCandidates::Count(6))
    .with_seed(1);
    let result = wrapper
        .query(
            &QueryRequest::new(x.view(), y.view())
                .with_batch_size(3)
                .with_return_utilities(true),
        )
        .unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(n_valid(result.utilities.unwrap().row(0)), 6);
}
