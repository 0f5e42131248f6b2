//! DDoS protection plans (`Microsoft.Network/ddosProtectionPlans`).
//!
//! The control plane allows a single plan per region in a subscription, so
//! plan lifecycles that share a location must not overlap. Creates refuse to
//! adopt an existing plan.

use std::fmt;
use std::str::FromStr;

use crate::id::{ParseError, ResourceId};
use crate::schema::{Attribute, AttributeFlags, AttributeType, ResourceSchema};
use crate::state::DesiredState;

/// Configuration-level type name.
pub const NAME: &str = "network_ddos_protection_plan";

/// Type path carried by identifiers.
pub const RESOURCE_TYPE: &str = "Microsoft.Network/ddosProtectionPlans";

const NAMESPACE: &str = "Microsoft.Network";
const TYPE_KEY: &str = "ddosProtectionPlans";

/// The schema for DDoS protection plans.
pub fn schema() -> ResourceSchema {
    ResourceSchema::new(NAME, RESOURCE_TYPE)
        .with_attribute("name", Attribute::required_string().with_force_new())
        .with_attribute("location", Attribute::required_string().with_force_new())
        .with_attribute(
            "resource_group_name",
            Attribute::required_string().with_force_new(),
        )
        .with_attribute("tags", Attribute::tags())
        .with_attribute(
            "virtual_network_ids",
            Attribute::new(
                AttributeType::list(AttributeType::String),
                AttributeFlags::computed(),
            ),
        )
        .with_requires_import()
}

/// Desired state for a plan with no tags.
pub fn desired(
    name: impl Into<String>,
    location: impl Into<String>,
    resource_group_name: impl Into<String>,
) -> DesiredState {
    DesiredState::new()
        .with_attribute("name", name.into())
        .with_attribute("location", location.into())
        .with_attribute("resource_group_name", resource_group_name.into())
}

/// Identifier of a DDoS protection plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DdosProtectionPlanId {
    /// Subscription.
    pub subscription_id: String,
    /// Resource group.
    pub resource_group: String,
    /// Plan name.
    pub name: String,
}

impl DdosProtectionPlanId {
    /// Create a plan identifier.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }

    /// The generic identifier.
    pub fn to_resource_id(&self) -> ResourceId {
        ResourceId::new(
            &self.subscription_id,
            &self.resource_group,
            NAMESPACE,
            TYPE_KEY,
            &self.name,
        )
    }
}

impl TryFrom<&ResourceId> for DdosProtectionPlanId {
    type Error = ParseError;

    fn try_from(id: &ResourceId) -> Result<Self, Self::Error> {
        id.expect_type(RESOURCE_TYPE)?;
        Ok(Self::new(id.subscription_id(), id.resource_group(), id.name()))
    }
}

impl From<DdosProtectionPlanId> for ResourceId {
    fn from(id: DdosProtectionPlanId) -> Self {
        id.to_resource_id()
    }
}

impl FromStr for DdosProtectionPlanId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(&ResourceId::parse(s)?)
    }
}

impl fmt::Display for DdosProtectionPlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_resource_id().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::WriteMode;
    use crate::validation::validate;
    use serde_json::json;

    const RAW: &str = "/subscriptions/0000/resourceGroups/acctestRG-1/providers/Microsoft.Network/ddosProtectionPlans/acctestddospplan-1";

    #[test]
    fn test_schema() {
        let schema = schema();
        assert_eq!(schema.create_mode(), WriteMode::CreateOnly);
        assert_eq!(
            schema.ignored_fields(),
            vec!["id".to_string(), "virtual_network_ids".to_string()]
        );
        assert!(schema.attributes["name"].force_new);
        assert!(!schema.attributes["tags"].force_new);
    }

    #[test]
    fn test_desired_validates() {
        let desired = desired("acctestddospplan-1", "westeurope", "acctestRG-1")
            .with_tags([("environment", "Production"), ("cost_center", "MSFT")]);
        assert!(validate(&schema(), &desired).is_empty());

        let desired = desired.with_attribute("virtual_network_ids", json!(["vnet"]));
        let diagnostics = validate(&schema(), &desired);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("virtual_network_ids".to_string()));
    }

    #[test]
    fn test_typed_id() {
        let id: DdosProtectionPlanId = RAW.parse().unwrap();
        assert_eq!(id.resource_group, "acctestRG-1");
        assert_eq!(id.name, "acctestddospplan-1");
        assert_eq!(id.to_string(), RAW);
        assert_eq!(ResourceId::from(id).to_string(), RAW);
    }

    #[test]
    fn test_typed_id_rejects_other_types() {
        let err = "/subscriptions/0000/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet"
            .parse::<DdosProtectionPlanId>()
            .unwrap_err();
        assert!(err.to_string().contains("ddosProtectionPlans"));

        let miscased = RAW.replace("resourceGroups", "resourcegroups");
        assert!(miscased.parse::<DdosProtectionPlanId>().is_err());
    }
}
