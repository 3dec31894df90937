//! Error types for query strategies and model adapters.
//!
//! Every fallible operation in this crate returns [`QueryError`]. Errors carry
//! a coarse [`ErrorKind`] so callers can tell a wrongly-typed configuration
//! apart from a well-typed but invalid one:
//!
//! - [`ErrorKind::Type`]: a value of the wrong kind (e.g. a string option where a
//!   bool is expected), an invalid argument combination, or a strategy that
//!   cannot work with the supplied candidate form.
//! - [`ErrorKind::Value`]: right kind, invalid value (out of range, shape
//!   mismatch, unknown method name).
//! - [`ErrorKind::Model`]: a failure reported by the wrapped model.
//!
//! Recoverable conditions (a batch or candidate pool larger than what is
//! available) are not errors; they are clipped and reported via `tracing`.

/// Coarse classification of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong kind of value or unsupported argument combination.
    Type,
    /// Right kind of value, invalid content.
    Value,
    /// The underlying model failed.
    Model,
}

/// Errors raised by model adapters (fit / predict).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Prediction was requested before `fit`.
    #[error("model is not fitted; call `fit` first")]
    NotFitted,

    /// A label in `y` is neither a known class nor the missing label.
    #[error("label {label} is not one of the classes {classes:?}")]
    UnknownLabel { label: f64, classes: Vec<f64> },

    /// Input has a different number of features than the training data.
    #[error("expected {expected} features, got {got}")]
    FeatureMismatch { expected: usize, got: usize },

    /// `X` and `y` have different lengths.
    #[error("X has {n_samples} samples but y has {n_labels} labels")]
    LengthMismatch { n_samples: usize, n_labels: usize },

    /// Invalid hyperparameter.
    #[error("{name} {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Errors raised by query strategies and the selection utilities.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// A value of the wrong kind was supplied.
    #[error("`{name}` must be {expected}, got {got}")]
    InvalidType {
        name: &'static str,
        expected: &'static str,
        got: String,
    },

    /// A value is outside its valid range or otherwise malformed.
    #[error("`{name}` {reason}")]
    InvalidValue { name: &'static str, reason: String },

    /// `X` and `y` disagree on the number of samples.
    #[error("X has {n_samples} samples but y has {n_labels} labels")]
    LengthMismatch { n_samples: usize, n_labels: usize },

    /// Candidate features have a different dimensionality than `X`.
    #[error("X has {x_features} features but candidates have {candidate_features}")]
    FeatureMismatch {
        x_features: usize,
        candidate_features: usize,
    },

    /// A candidate index does not address a row of `X`.
    #[error("candidate index {index} is out of bounds for {n_samples} samples")]
    IndexOutOfBounds { index: usize, n_samples: usize },

    /// The configured classes differ from the classes known to the model.
    #[error("classes {given:?} do not match the classes of the model {model:?}")]
    ClassMismatch { given: Vec<f64>, model: Vec<f64> },

    /// The strategy needs candidates that map into `X`.
    #[error("{strategy} requires candidates given as indices into X (or none)")]
    MappingRequired { strategy: &'static str },

    /// Selection was attempted on utilities that are all `NaN`.
    #[error("all utilities are NaN; there is no candidate to select")]
    NoValidUtility,

    /// The worker pool could not be created.
    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),

    /// Error from the wrapped model.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl QueryError {
    /// Convenience constructor for [`QueryError::InvalidValue`].
    pub fn invalid_value(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name,
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`QueryError::InvalidType`].
    pub fn invalid_type(name: &'static str, expected: &'static str, got: impl Into<String>) -> Self {
        Self::InvalidType {
            name,
            expected,
            got: got.into(),
        }
    }

    /// Coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidType { .. } | Self::MappingRequired { .. } => ErrorKind::Type,
            Self::InvalidValue { .. }
            | Self::LengthMismatch { .. }
            | Self::FeatureMismatch { .. }
            | Self::IndexOutOfBounds { .. }
            | Self::ClassMismatch { .. }
            | Self::NoValidUtility
            | Self::ThreadPool(_) => ErrorKind::Value,
            Self::Model(_) => ErrorKind::Model,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = QueryError> = std::result::Result<T, E>;
