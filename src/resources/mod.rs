//! Built-in resource definitions.
//!
//! Each submodule describes one managed resource type: its [`ResourceSchema`],
//! a typed identifier, and a helper for building desired state in the shape
//! the control plane expects.

pub mod app_service_hybrid_connection;
pub mod ddos_protection_plan;

use crate::id::ResourceId;
use crate::schema::ResourceSchema;

/// Schemas for every built-in resource type.
pub fn all() -> Vec<ResourceSchema> {
    vec![
        app_service_hybrid_connection::schema(),
        ddos_protection_plan::schema(),
    ]
}

/// Find the schema whose type path matches an identifier.
pub fn schema_for_id(id: &ResourceId) -> Option<ResourceSchema> {
    let resource_type = id.resource_type();
    all()
        .into_iter()
        .find(|schema| schema.resource_type == resource_type)
}

/// Find a schema by its configuration-level name.
pub fn schema_by_name(name: &str) -> Option<ResourceSchema> {
    all().into_iter().find(|schema| schema.name == name)
}
