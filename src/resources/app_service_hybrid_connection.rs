//! App Service hybrid connections
//! (`Microsoft.Web/sites/hybridConnectionNamespaces/relays`).
//!
//! A hybrid connection is a child of an app service, addressed by the site,
//! the relay namespace and the relay name. The send key is write-only: the
//! control plane never returns it, so it is excluded from comparisons.

use std::fmt;
use std::str::FromStr;

use crate::id::{ParseError, ResourceId};
use crate::schema::{Attribute, ResourceSchema};
use crate::state::DesiredState;

/// Configuration-level type name.
pub const NAME: &str = "app_service_hybrid_connection";

/// Type path carried by identifiers.
pub const RESOURCE_TYPE: &str = "Microsoft.Web/sites/hybridConnectionNamespaces/relays";

const NAMESPACE: &str = "Microsoft.Web";
const SITES: &str = "sites";
const NAMESPACES: &str = "hybridConnectionNamespaces";
const RELAYS: &str = "relays";

/// The schema for hybrid connections.
pub fn schema() -> ResourceSchema {
    ResourceSchema::new(NAME, RESOURCE_TYPE)
        .with_attribute(
            "app_service_name",
            Attribute::required_string().with_force_new(),
        )
        .with_attribute(
            "resource_group_name",
            Attribute::required_string().with_force_new(),
        )
        .with_attribute(
            "namespace_name",
            Attribute::required_string().with_force_new(),
        )
        .with_attribute("relay_name", Attribute::required_string().with_force_new())
        .with_attribute("relay_arm_uri", Attribute::required_string())
        .with_attribute("hostname", Attribute::required_string())
        .with_attribute("port", Attribute::required_int64())
        .with_attribute("service_bus_namespace", Attribute::required_string())
        .with_attribute("send_key_name", Attribute::required_string())
        .with_attribute("send_key_value", Attribute::required_string().sensitive())
        .with_attribute("service_bus_suffix", Attribute::computed_string())
}

/// Identifier of a hybrid connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HybridConnectionId {
    /// Subscription.
    pub subscription_id: String,
    /// Resource group.
    pub resource_group: String,
    /// The app service the connection belongs to.
    pub app_service_name: String,
    /// Relay namespace.
    pub namespace_name: String,
    /// Relay name.
    pub relay_name: String,
}

impl HybridConnectionId {
    /// Create a hybrid connection identifier.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        app_service_name: impl Into<String>,
        namespace_name: impl Into<String>,
        relay_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            app_service_name: app_service_name.into(),
            namespace_name: namespace_name.into(),
            relay_name: relay_name.into(),
        }
    }

    /// The generic identifier.
    pub fn to_resource_id(&self) -> ResourceId {
        ResourceId::new(
            &self.subscription_id,
            &self.resource_group,
            NAMESPACE,
            SITES,
            &self.app_service_name,
        )
        .child(NAMESPACES, &self.namespace_name)
        .child(RELAYS, &self.relay_name)
    }

    /// The app service this connection is attached to.
    pub fn app_service_id(&self) -> ResourceId {
        ResourceId::new(
            &self.subscription_id,
            &self.resource_group,
            NAMESPACE,
            SITES,
            &self.app_service_name,
        )
    }
}

impl TryFrom<&ResourceId> for HybridConnectionId {
    type Error = ParseError;

    fn try_from(id: &ResourceId) -> Result<Self, Self::Error> {
        id.expect_type(RESOURCE_TYPE)?;
        let segment = |key: &str| id.segment(key).unwrap_or_default().to_string();
        Ok(Self::new(
            id.subscription_id(),
            id.resource_group(),
            segment(SITES),
            segment(NAMESPACES),
            segment(RELAYS),
        ))
    }
}

impl From<HybridConnectionId> for ResourceId {
    fn from(id: HybridConnectionId) -> Self {
        id.to_resource_id()
    }
}

impl FromStr for HybridConnectionId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(&ResourceId::parse(s)?)
    }
}

impl fmt::Display for HybridConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_resource_id().fmt(f)
    }
}

/// Desired state for a hybrid connection.
#[derive(Debug, Clone)]
pub struct HybridConnectionConfig {
    /// Where the connection lives.
    pub id: HybridConnectionId,
    /// Full identifier of the relay hybrid connection.
    pub relay_arm_uri: String,
    /// Endpoint host name.
    pub hostname: String,
    /// Endpoint port.
    pub port: u16,
    /// Service Bus namespace that issues the send key.
    pub service_bus_namespace: String,
    /// Name of the send key.
    pub send_key_name: String,
    /// Value of the send key.
    pub send_key_value: String,
}

impl HybridConnectionConfig {
    /// Render as desired state.
    pub fn to_desired(&self) -> DesiredState {
        DesiredState::new()
            .with_attribute("app_service_name", self.id.app_service_name.as_str())
            .with_attribute("resource_group_name", self.id.resource_group.as_str())
            .with_attribute("namespace_name", self.id.namespace_name.as_str())
            .with_attribute("relay_name", self.id.relay_name.as_str())
            .with_attribute("relay_arm_uri", self.relay_arm_uri.as_str())
            .with_attribute("hostname", self.hostname.as_str())
            .with_attribute("port", self.port)
            .with_attribute("service_bus_namespace", self.service_bus_namespace.as_str())
            .with_attribute("send_key_name", self.send_key_name.as_str())
            .with_attribute("send_key_value", self.send_key_value.as_str())
    }
}
