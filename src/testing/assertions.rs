//! Assertion helpers for observed state.
//!
//! All helpers panic with a message naming the attribute path, so a failing
//! lifecycle test points straight at the field that drifted.

use serde_json::Value;

use crate::diff::compare;
use crate::state::{DesiredState, ObservedState};

/// Assert that observed state matches desired state.
///
/// # Panics
///
/// Panics listing every mismatch.
pub fn assert_converged<S: AsRef<str>>(
    observed: &ObservedState,
    desired: &DesiredState,
    ignored: &[S],
) {
    let mismatches = compare(observed, desired, ignored);
    assert!(
        mismatches.is_empty(),
        "Expected observed state to match desired state, but got {} mismatch(es):\n{}",
        mismatches.len(),
        mismatches
            .iter()
            .map(|m| format!("  {}", m))
            .collect::<Vec<_>>()
            .join("\n")
    );
}

/// Assert that a dotted path holds `expected`.
///
/// # Panics
///
/// Panics if the path is missing or holds another value.
pub fn assert_attribute(observed: &ObservedState, path: &str, expected: impl Into<Value>) {
    let expected = expected.into();
    match observed.get_path(path) {
        Some(actual) => assert_eq!(
            actual, &expected,
            "Expected '{}' to be {}, got {}",
            path, expected, actual
        ),
        None => panic!("Expected '{}' to be {}, but it is not set", path, expected),
    }
}

/// Assert that a dotted path is set to a non-null value.
///
/// # Panics
///
/// Panics if the path is missing or null.
pub fn assert_attribute_exists(observed: &ObservedState, path: &str) {
    assert!(
        observed.get_path(path).is_some_and(|v| !v.is_null()),
        "Expected '{}' to be set",
        path
    );
}

/// Assert that a dotted path is not set.
///
/// # Panics
///
/// Panics if the path holds a non-null value.
pub fn assert_attribute_absent(observed: &ObservedState, path: &str) {
    if let Some(actual) = observed.get_path(path).filter(|v| !v.is_null()) {
        panic!("Expected '{}' to be absent, got {}", path, actual);
    }
}

/// Assert the number of entries in a map or list attribute.
///
/// An absent attribute counts as empty.
///
/// # Panics
///
/// Panics on a count mismatch or if the path holds a scalar.
pub fn assert_map_len(observed: &ObservedState, path: &str, expected: usize) {
    let actual = match observed.get_path(path) {
        None | Some(Value::Null) => 0,
        Some(Value::Object(map)) => map.len(),
        Some(Value::Array(items)) => items.len(),
        Some(other) => panic!("Expected '{}' to be a map, got {}", path, other),
    };
    assert_eq!(
        actual, expected,
        "Expected '{}' to have {} entries, got {}",
        path, expected, actual
    );
}
