//! Schema types for describing managed resource types.
//!
//! A [`ResourceSchema`] names a resource type, the control-plane type path
//! its identifiers carry, and the attributes its desired state may hold. The
//! schema drives three things:
//!
//! - validation of desired state before anything is submitted,
//! - the default set of fields [`compare`](crate::compare) should skip
//!   (computed and write-only attributes),
//! - whether creates must refuse to overwrite an existing resource.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::reconciler::WriteMode;

/// The type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string value.
    String,
    /// A 64-bit integer.
    Int64,
    /// A boolean value.
    Bool,
    /// A list of values of a single type.
    List(Box<AttributeType>),
    /// A map from string keys to values of a single type.
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// Create a list type.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: AttributeType) -> Self {
        Self::Map(Box::new(element_type))
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute must be present in desired state.
    pub required: bool,
    /// The attribute may be present in desired state.
    pub optional: bool,
    /// The control plane assigns the value.
    pub computed: bool,
    /// The value is secret and never read back from the control plane.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Flags for a computed (read-only) attribute.
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Whether only the control plane may set this attribute.
    pub fn is_computed_only(self) -> bool {
        self.computed && !self.required && !self.optional
    }
}

/// Describes a single attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// The type of the attribute.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// How the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Changing this attribute requires replacing the resource.
    #[serde(default)]
    pub force_new: bool,
}

impl Attribute {
    /// Create an attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            force_new: false,
        }
    }

    /// A required string.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// A computed string.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// A required int64.
    pub fn required_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::required())
    }

    /// An optional `map(string)`, the shape of `tags`.
    pub fn tags() -> Self {
        Self::new(
            AttributeType::map(AttributeType::String),
            AttributeFlags::optional(),
        )
    }

    /// Mark this attribute as forcing replacement when changed.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }
}

/// Schema for one managed resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    /// The configuration-level type name, e.g. `network_ddos_protection_plan`.
    pub name: String,
    /// The type path identifiers carry, e.g. `Microsoft.Network/ddosProtectionPlans`.
    pub resource_type: String,
    /// Attributes by name.
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    /// Creates must fail if a resource with the same id already exists.
    #[serde(default)]
    pub requires_import: bool,
}

impl ResourceSchema {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            attributes: BTreeMap::new(),
            requires_import: false,
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Refuse to adopt existing resources on create.
    pub fn with_requires_import(mut self) -> Self {
        self.requires_import = true;
        self
    }

    /// Fields [`compare`](crate::compare) should skip: computed-only and
    /// sensitive attributes, plus the server-assigned `id`.
    pub fn ignored_fields(&self) -> Vec<String> {
        let mut fields = vec!["id".to_string()];
        fields.extend(
            self.attributes
                .iter()
                .filter(|(name, attr)| {
                    name.as_str() != "id" && (attr.flags.is_computed_only() || attr.flags.sensitive)
                })
                .map(|(name, _)| name.clone()),
        );
        fields
    }

    /// How the first write of a new resource must be submitted.
    pub fn create_mode(&self) -> WriteMode {
        if self.requires_import {
            WriteMode::CreateOnly
        } else {
            WriteMode::Upsert
        }
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// Prevents the operation.
    Error,
    /// Worth reporting but does not block.
    Warning,
}

/// A validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity.
    pub severity: DiagnosticSeverity,
    /// A short summary.
    pub summary: String,
    /// Longer explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Dotted path of the offending attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// An error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// A warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Attach detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach the attribute path.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic blocks the operation.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}
