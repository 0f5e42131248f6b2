//! Structural comparison of observed state against desired state.
//!
//! [`compare`] walks every attribute the desired state declares and reports
//! where the observed state disagrees. An empty result means the resource has
//! converged.
//!
//! Rules:
//!
//! - Top-level attributes present only in the observed state are ignored;
//!   they are server-assigned (ids, computed lists).
//! - Nested maps are compared key by key. A key present in an observed map
//!   but not in the desired one is reported as [`MismatchKind::Unexpected`],
//!   so dropping a tag is detected.
//! - A desired `null`, empty map or empty list matches an absent attribute.
//! - Numbers compare numerically, so `80` matches `80.0`.
//! - Ignored fields match an exact dotted path or any path beneath it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::{join_path, DesiredState, ObservedState};

/// How an attribute disagrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Declared but not present remotely.
    Missing,
    /// Present remotely with a different value.
    Differs,
    /// Present remotely inside a declared map, but not declared.
    Unexpected,
}

/// A single disagreement between observed and desired state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Dotted path to the attribute.
    pub path: String,
    /// How it disagrees.
    pub kind: MismatchKind,
    /// The declared value (None for unexpected keys).
    pub expected: Option<Value>,
    /// The remote value (None for missing keys).
    pub actual: Option<Value>,
}

impl Mismatch {
    /// A declared attribute that is missing remotely.
    pub fn missing(path: impl Into<String>, expected: Value) -> Self {
        Self {
            path: path.into(),
            kind: MismatchKind::Missing,
            expected: Some(expected),
            actual: None,
        }
    }

    /// An attribute whose remote value differs.
    pub fn differs(path: impl Into<String>, expected: Value, actual: Value) -> Self {
        Self {
            path: path.into(),
            kind: MismatchKind::Differs,
            expected: Some(expected),
            actual: Some(actual),
        }
    }

    /// A remote key that was not declared.
    pub fn unexpected(path: impl Into<String>, actual: Value) -> Self {
        Self {
            path: path.into(),
            kind: MismatchKind::Unexpected,
            expected: None,
            actual: Some(actual),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.expected, &self.actual) {
            (Some(expected), Some(actual)) => {
                write!(f, "{}: expected {}, got {}", self.path, expected, actual)
            },
            (Some(expected), None) => write!(f, "{}: expected {}, but it is missing", self.path, expected),
            (None, Some(actual)) => write!(f, "{}: unexpected value {}", self.path, actual),
            (None, None) => write!(f, "{}: mismatch", self.path),
        }
    }
}

/// Compare observed state against desired state.
///
/// Returns mismatches in sorted key order. Empty means converged.
///
/// # Example
///
/// ```
/// use hemmer_reconciler::{compare, DesiredState, ObservedState};
/// use serde_json::json;
///
/// let desired = DesiredState::new().with_tags([("environment", "Staging")]);
/// let observed = ObservedState::from_value(json!({
///     "id": "server-assigned",
///     "tags": {"environment": "Staging", "cost_center": "MSFT"}
/// })).unwrap();
///
/// let mismatches = compare(&observed, &desired, &["id"]);
/// assert_eq!(mismatches.len(), 1);
/// assert_eq!(mismatches[0].path, "tags.cost_center");
/// ```
pub fn compare<S: AsRef<str>>(
    observed: &ObservedState,
    desired: &DesiredState,
    ignored: &[S],
) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    for (name, expected) in desired.attributes() {
        compare_value(
            name,
            expected,
            observed.get(name),
            ignored,
            &mut mismatches,
        );
    }
    mismatches
}

fn compare_value<S: AsRef<str>>(
    path: &str,
    expected: &Value,
    actual: Option<&Value>,
    ignored: &[S],
    mismatches: &mut Vec<Mismatch>,
) {
    if is_ignored(path, ignored) {
        return;
    }

    match (expected, actual) {
        (want, None) | (want, Some(Value::Null)) => {
            if !is_unset(want) {
                mismatches.push(Mismatch::missing(path, want.clone()));
            }
        },
        (Value::Object(want), Some(Value::Object(have))) => {
            for (key, value) in want {
                compare_value(
                    &join_path(path, key),
                    value,
                    have.get(key),
                    ignored,
                    mismatches,
                );
            }
            for (key, value) in have {
                let key_path = join_path(path, key);
                if !want.contains_key(key) && !is_ignored(&key_path, ignored) {
                    mismatches.push(Mismatch::unexpected(key_path, value.clone()));
                }
            }
        },
        (want, Some(have)) => {
            if !values_equal(want, have) {
                mismatches.push(Mismatch::differs(path, want.clone(), have.clone()));
            }
        },
    }
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        },
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        },
        _ => a == b,
    }
}

fn is_ignored<S: AsRef<str>>(path: &str, ignored: &[S]) -> bool {
    ignored.iter().any(|field| {
        let field = field.as_ref();
        path == field
            || path
                .strip_prefix(field)
                .is_some_and(|rest| rest.starts_with('.'))
    })
}
