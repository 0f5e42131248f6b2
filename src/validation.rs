//! Desired-state validation.
//!
//! Checks a [`DesiredState`] against a [`ResourceSchema`] before anything is
//! sent to the control plane. Updates are also checked against the current
//! state, which warns about changes that force a replacement.
//!
//! # Example
//!
//! ```
//! use hemmer_reconciler::schema::{Attribute, ResourceSchema};
//! use hemmer_reconciler::validation::validate;
//! use hemmer_reconciler::DesiredState;
//!
//! let schema = ResourceSchema::new("widget", "Example.Service/widgets")
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("port", Attribute::required_int64());
//!
//! let desired = DesiredState::new()
//!     .with_attribute("name", "w1")
//!     .with_attribute("port", "eighty");
//!
//! let diagnostics = validate(&schema, &desired);
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("port".to_string()));
//! ```

use serde_json::Value;

use crate::diff::values_equal;
use crate::schema::{Attribute, AttributeType, Diagnostic, ResourceSchema};
use crate::state::{join_path, DesiredState, ObservedState};

/// Validate desired state against a schema.
///
/// # Rules
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes must not be set
/// - Attributes the schema does not declare are rejected
/// - Values must match the declared type
pub fn validate(schema: &ResourceSchema, desired: &DesiredState) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for (name, attr) in &schema.attributes {
        validate_attribute(name, attr, desired.get(name), &mut diagnostics);
    }

    for name in desired.attributes().keys() {
        if !schema.attributes.contains_key(name) {
            diagnostics.push(
                Diagnostic::error(format!("Unknown attribute '{}'", name))
                    .with_detail(format!(
                        "'{}' does not declare this attribute",
                        schema.name
                    ))
                    .with_attribute(name.as_str()),
            );
        }
    }

    diagnostics
}

/// Validate an update of an existing resource.
///
/// Runs [`validate`], then warns for every `force_new` attribute whose value
/// differs from `prior`. Such a change replaces the resource rather than
/// updating it in place.
pub fn validate_update(
    schema: &ResourceSchema,
    prior: &ObservedState,
    desired: &DesiredState,
) -> Vec<Diagnostic> {
    let mut diagnostics = validate(schema, desired);

    let force_new = schema
        .attributes
        .iter()
        .filter(|(_, attr)| attr.force_new)
        .map(|(name, _)| name);
    for name in force_new {
        let (Some(before), Some(after)) = (prior.get(name), desired.get(name)) else {
            continue;
        };
        if !values_equal(before, after) {
            diagnostics.push(
                Diagnostic::warning(format!("Changing '{}' forces replacement", name))
                    .with_detail(format!("{} -> {}", before, after))
                    .with_attribute(name.as_str()),
            );
        }
    }

    diagnostics
}

/// Separate blocking diagnostics from warnings.
///
/// Returns `Ok` with the warnings when there are no errors, and `Err` with
/// only the errors otherwise.
pub fn split_diagnostics(
    diagnostics: Vec<Diagnostic>,
) -> Result<Vec<Diagnostic>, Vec<Diagnostic>> {
    let (errors, warnings): (Vec<_>, Vec<_>) =
        diagnostics.into_iter().partition(Diagnostic::is_error);
    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(errors)
    }
}

/// Validate, returning `Err` with the error diagnostics if any were found.
pub fn validate_result(
    schema: &ResourceSchema,
    desired: &DesiredState,
) -> Result<(), Vec<Diagnostic>> {
    split_diagnostics(validate(schema, desired)).map(|_| ())
}

fn validate_attribute(
    name: &str,
    attr: &Attribute,
    value: Option<&Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", name))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(name),
                );
            }
        },
        Some(_) if attr.flags.is_computed_only() => {
            diagnostics.push(
                Diagnostic::error(format!("Attribute '{}' cannot be set", name))
                    .with_detail("This attribute is assigned by the control plane")
                    .with_attribute(name),
            );
        },
        Some(v) => validate_type(&attr.attr_type, v, name, diagnostics),
    }
}

fn validate_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(
                        element_type,
                        item,
                        &join_path(path, &i.to_string()),
                        diagnostics,
                    );
                }
            },
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Map(value_type) => match value.as_object() {
            Some(entries) => {
                for (key, entry) in entries {
                    validate_type(value_type, entry, &join_path(path, key), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n
                    .as_f64()
                    .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
        },
        _ => false,
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeFlags;
    use serde_json::json;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("widget", "Example.Service/widgets")
            .with_attribute("name", Attribute::required_string())
            .with_attribute("port", Attribute::required_int64())
            .with_attribute("enabled", Attribute::new(AttributeType::Bool, AttributeFlags::optional()))
            .with_attribute("tags", Attribute::tags())
            .with_attribute(
                "zones",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::optional(),
                ),
            )
            .with_attribute("fingerprint", Attribute::computed_string())
    }

    fn desired(value: Value) -> DesiredState {
        DesiredState::from_value(value).unwrap()
    }

    #[test]
    fn test_valid() {
        let diagnostics = validate(
            &schema(),
            &desired(json!({
                "name": "w1",
                "port": 80,
                "enabled": true,
                "tags": {"environment": "Production"},
                "zones": ["1", "2"]
            })),
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_missing_required() {
        let diagnostics = validate(&schema(), &desired(json!({"name": "w1", "port": null})));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("port".to_string()));
        assert!(diagnostics[0].summary.contains("Missing required"));
    }

    #[test]
    fn test_computed_cannot_be_set() {
        let diagnostics = validate(
            &schema(),
            &desired(json!({"name": "w1", "port": 1, "fingerprint": "abc"})),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("cannot be set"));
    }

    #[test]
    fn test_unknown_attribute() {
        let diagnostics = validate(
            &schema(),
            &desired(json!({"name": "w1", "port": 1, "colour": "blue"})),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("colour".to_string()));
    }

    #[test]
    fn test_nested_type_errors_have_paths() {
        let diagnostics = validate(
            &schema(),
            &desired(json!({
                "name": "w1",
                "port": 1,
                "tags": {"environment": 7},
                "zones": ["1", 2]
            })),
        );
        let paths: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.clone())
            .collect();
        assert_eq!(paths, vec!["tags.environment".to_string(), "zones.1".to_string()]);
    }

    #[test]
    fn test_int64() {
        let s = schema();
        assert!(validate(&s, &desired(json!({"name": "w", "port": 80.0}))).is_empty());
        assert_eq!(validate(&s, &desired(json!({"name": "w", "port": 80.5}))).len(), 1);
        assert_eq!(validate(&s, &desired(json!({"name": "w", "port": "80"}))).len(), 1);
    }

    #[test]
    fn test_update_warns_on_force_new_change() {
        let schema = schema().with_attribute("region", Attribute::required_string().with_force_new());
        let prior = ObservedState::from_value(json!({"name": "w1", "port": 80, "region": "westeurope"}))
            .unwrap();

        let same = desired(json!({"name": "w1", "port": 8080, "region": "westeurope"}));
        assert!(validate_update(&schema, &prior, &same).is_empty());

        let moved = desired(json!({"name": "w1", "port": 80, "region": "northeurope"}));
        let diagnostics = validate_update(&schema, &prior, &moved);
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].is_error());
        assert_eq!(diagnostics[0].attribute, Some("region".to_string()));
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("\"westeurope\" -> \"northeurope\"")
        );

        // Warnings alone do not block.
        let warnings = split_diagnostics(diagnostics).unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_split_diagnostics_keeps_only_errors() {
        let schema = schema().with_attribute("region", Attribute::required_string().with_force_new());
        let prior = ObservedState::from_value(json!({"region": "westeurope"})).unwrap();
        let desired = desired(json!({"name": "w1", "region": "northeurope"}));

        let diagnostics = validate_update(&schema, &prior, &desired);
        assert_eq!(diagnostics.len(), 2);
        let errors = split_diagnostics(diagnostics).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].attribute, Some("port".to_string()));
    }

    #[test]
    fn test_validate_result() {
        assert!(validate_result(&schema(), &desired(json!({"name": "w", "port": 1}))).is_ok());
        let errors = validate_result(&schema(), &desired(json!({}))).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
