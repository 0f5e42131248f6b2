//! Desired and observed resource state.
//!
//! Both are flat-at-the-top JSON objects: attribute name to value, where a
//! value may itself be a map (tags) or a list. Keys iterate in sorted order,
//! not insertion order, so every comparison and rendering is deterministic.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What the user wants the remote resource to look like.
///
/// Built once per step and not mutated afterwards: every builder method
/// consumes `self`.
///
/// # Example
///
/// ```
/// use hemmer_reconciler::DesiredState;
///
/// let desired = DesiredState::new()
///     .with_attribute("name", "acctestddospplan-1")
///     .with_attribute("location", "westeurope")
///     .with_tags([("environment", "Production"), ("cost_center", "MSFT")]);
///
/// assert_eq!(desired.get("location").unwrap(), "westeurope");
/// assert_eq!(desired.get_path("tags.environment").unwrap(), "Production");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredState {
    attributes: Map<String, Value>,
}

impl DesiredState {
    /// Create an empty desired state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a materialized JSON object.
    ///
    /// Fails if the value is not an object.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the `tags` map.
    pub fn with_tags<K, V>(self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let tags: Map<String, Value> = tags
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        self.with_attribute("tags", Value::Object(tags))
    }

    /// Drop an attribute.
    pub fn without_attribute(mut self, name: &str) -> Self {
        self.attributes.remove(name);
        self
    }

    /// Look up a top-level attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Look up a dotted path such as `tags.environment`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.attributes, path)
    }

    /// All attributes.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Number of top-level attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Render as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.attributes.clone())
    }
}

/// The fields a read returned for a remote resource.
///
/// Fetched fresh for every verification and discarded afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservedState {
    attributes: Map<String, Value>,
}

impl ObservedState {
    /// Build from the JSON object a read returned.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Build from an attribute map.
    pub fn from_map(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }

    /// Look up a top-level attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Look up a dotted path such as `tags.environment`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.attributes, path)
    }

    /// The server-assigned `id` attribute, if present.
    pub fn id(&self) -> Option<&str> {
        self.attributes.get("id").and_then(Value::as_str)
    }

    /// All attributes.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Treat what was observed as the desired state, e.g. for an import check.
    pub fn to_desired(&self) -> DesiredState {
        DesiredState {
            attributes: self.attributes.clone(),
        }
    }

    /// Render as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.attributes.clone())
    }
}

/// Walk a dotted path. Numeric components index into lists.
fn lookup_path<'a>(attributes: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = attributes.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub(crate) fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}
