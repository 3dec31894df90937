//! Input validation shared by all strategies.
//!
//! Validators return `Err` before any expensive work is done. Soft problems
//! (e.g. a cost matrix with negative entries) are logged and accepted.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{QueryError, Result};
use crate::labels::MissingLabel;

/// Validate a training set: matching lengths and labels consistent with the
/// missing-label sentinel.
///
/// A non-`NaN` sentinel forbids `NaN` labels, since those could never be
/// recognized as missing.
pub fn check_x_y(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    missing_label: MissingLabel,
) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(QueryError::LengthMismatch {
            n_samples: x.nrows(),
            n_labels: y.len(),
        });
    }
    if !missing_label.is_nan() && y.iter().any(|v| v.is_nan()) {
        return Err(QueryError::invalid_value(
            "y",
            format!(
                "contains NaN although the missing label is {}",
                missing_label.value()
            ),
        ));
    }
    Ok(())
}

/// `batch_size` must be at least 1.
pub fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(QueryError::invalid_value("batch_size", "must be >= 1, got 0"));
    }
    Ok(())
}

/// Validate a class list: non-empty, finite, unique, and disjoint from the
/// missing label.
pub fn check_classes(classes: &[f64], missing_label: MissingLabel) -> Result<()> {
    if classes.is_empty() {
        return Err(QueryError::invalid_value("classes", "must not be empty"));
    }
    for (i, &c) in classes.iter().enumerate() {
        if !c.is_finite() {
            return Err(QueryError::invalid_value(
                "classes",
                format!("must be finite, got {c}"),
            ));
        }
        if missing_label.matches(c) {
            return Err(QueryError::invalid_value(
                "classes",
                format!("must not contain the missing label {c}"),
            ));
        }
        if classes[..i].contains(&c) {
            return Err(QueryError::invalid_value(
                "classes",
                format!("must be unique, {c} appears twice"),
            ));
        }
    }
    Ok(())
}

/// Validate a cost matrix against the number of classes.
///
/// The matrix must be square with `n_classes` rows and contain only finite
/// values. Negative costs are accepted but logged.
pub fn check_cost_matrix(cost_matrix: &Array2<f64>, n_classes: usize) -> Result<()> {
    if cost_matrix.dim() != (n_classes, n_classes) {
        return Err(QueryError::invalid_value(
            "cost_matrix",
            format!(
                "must have shape ({n_classes}, {n_classes}), got {:?}",
                cost_matrix.dim()
            ),
        ));
    }
    if cost_matrix.iter().any(|c| !c.is_finite()) {
        return Err(QueryError::invalid_value("cost_matrix", "must contain only finite values"));
    }
    if cost_matrix.iter().any(|&c| c < 0.0) {
        tracing::warn!("cost_matrix contains negative entries");
    }
    Ok(())
}

/// The 0/1-loss cost matrix `1 - I`.
pub fn zero_one_cost_matrix(n_classes: usize) -> Array2<f64> {
    Array2::from_shape_fn((n_classes, n_classes), |(i, j)| if i == j { 0.0 } else { 1.0 })
}

/// Every labeled entry of `y` must be one of `classes`.
pub fn check_labels_in_classes(
    y: ArrayView1<'_, f64>,
    classes: &[f64],
    missing_label: MissingLabel,
) -> Result<()> {
    for &label in y.iter() {
        if !missing_label.matches(label) && !classes.contains(&label) {
            return Err(QueryError::invalid_value(
                "y",
                format!("label {label} is not one of the classes {classes:?}"),
            ));
        }
    }
    Ok(())
}

/// Position of `label` in `classes`.
#[inline]
pub fn class_index(classes: &[f64], label: f64) -> Option<usize> {
    classes.iter().position(|&c| c == label)
}
