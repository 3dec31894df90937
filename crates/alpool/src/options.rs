//! Extra query options.
//!
//! Strategies occasionally accept per-call settings beyond the common request
//! fields (e.g. whether a committee should be refitted). These travel in a
//! [`QueryOptions`] map that wrappers forward verbatim to the strategy they
//! wrap. Each strategy reads only the keys it understands and reports a
//! type error when a known key holds the wrong kind of value.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{QueryError, Result};

/// A dynamically-typed option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl OptionValue {
    /// Name of the value's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "int",
            OptionValue::Float(_) => "float",
            OptionValue::Str(_) => "string",
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(v) => write!(f, "{v}"),
            OptionValue::Int(v) => write!(f, "{v}"),
            OptionValue::Float(v) => write!(f, "{v}"),
            OptionValue::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

/// Ordered map of extra options keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions(BTreeMap<String, OptionValue>);

/// Shared empty option set used as the request default.
pub static NO_OPTIONS: QueryOptions = QueryOptions::new();

impl QueryOptions {
    /// Empty option set.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Read a bool option, `default` when absent.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidType`] when the key holds a non-bool value.
    pub fn get_bool(&self, key: &'static str, default: bool) -> Result<bool> {
        match self.0.get(key) {
            None => Ok(default),
            Some(OptionValue::Bool(v)) => Ok(*v),
            Some(other) => Err(QueryError::invalid_type(key, "a bool", other.to_string())),
        }
    }

    /// Read a non-negative integer option, `None` when absent.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidType`] for non-integers, [`QueryError::InvalidValue`]
    /// for negative integers.
    pub fn get_usize(&self, key: &'static str) -> Result<Option<usize>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(OptionValue::Int(v)) => usize::try_from(*v)
                .map(Some)
                .map_err(|_| QueryError::invalid_value(key, format!("must be >= 0, got {v}"))),
            Some(other) => Err(QueryError::invalid_type(key, "an integer", other.to_string())),
        }
    }

    /// Read a string option, `None` when absent.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidType`] when the key holds a non-string value.
    pub fn get_str(&self, key: &'static str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(OptionValue::Str(v)) => Ok(Some(v.as_str())),
            Some(other) => Err(QueryError::invalid_type(key, "a string", other.to_string())),
        }
    }

    /// Reject keys that are not in `allowed`.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidType`] naming the first unknown key.
    pub fn check_keys(&self, name: &'static str, allowed: &[&str]) -> Result<()> {
        match self.keys().find(|k| !allowed.contains(k)) {
            Some(unknown) => Err(QueryError::invalid_type(
                name,
                "a map of known keys",
                format!("unknown key {unknown:?} (allowed: {allowed:?})"),
            )),
            None => Ok(()),
        }
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for QueryOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
