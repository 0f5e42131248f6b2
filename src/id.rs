//! Resource identifiers.
//!
//! Control planes hand back opaque identifiers of the form:
//!
//! ```text
//! /subscriptions/{subscription}/resourceGroups/{group}/providers/{Namespace}/{type}/{name}[/{type}/{name}]*
//! ```
//!
//! [`ResourceId::parse`] accepts only this canonical layout, with the fixed
//! keys spelled exactly as above. Anything else is a [`ParseError`]; there are
//! no recoverable defaults. A parsed identifier renders back to the exact
//! string it came from.
//!
//! # Example
//!
//! ```
//! use hemmer_reconciler::ResourceId;
//!
//! let raw = "/subscriptions/0000/resourceGroups/acctestRG-1/providers/Microsoft.Network/ddosProtectionPlans/plan1";
//! let id = ResourceId::parse(raw).unwrap();
//!
//! assert_eq!(id.resource_group(), "acctestRG-1");
//! assert_eq!(id.segment("ddosProtectionPlans"), Some("plan1"));
//! assert_eq!(id.resource_type(), "Microsoft.Network/ddosProtectionPlans");
//! assert_eq!(id.to_string(), raw);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const SUBSCRIPTIONS: &str = "subscriptions";
const RESOURCE_GROUPS: &str = "resourceGroups";
const PROVIDERS: &str = "providers";

/// Why an identifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorReason {
    /// The identifier does not start with `/`.
    #[error("identifier must start with '/'")]
    MissingLeadingSlash,
    /// The identifier ends with `/`.
    #[error("identifier must not end with '/'")]
    TrailingSlash,
    /// Two consecutive slashes produced an empty segment.
    #[error("segment {0} is empty")]
    EmptySegment(usize),
    /// A key has no value following it.
    #[error("segment '{0}' has no value")]
    UnpairedSegment(String),
    /// The `subscriptions` scope is missing or not first.
    #[error("missing 'subscriptions' segment")]
    MissingSubscription,
    /// The `resourceGroups` segment is missing or out of place.
    #[error("missing 'resourceGroups' segment")]
    MissingResourceGroup,
    /// The `providers` segment is missing or out of place.
    #[error("missing 'providers' segment")]
    MissingProviders,
    /// The provider namespace is not of the form `Company.Service`.
    #[error("invalid provider namespace '{0}'")]
    InvalidNamespace(String),
    /// No `{type}/{name}` pair follows the namespace.
    #[error("missing resource type segment")]
    MissingResourceType,
    /// A fixed key was spelled with the wrong case.
    #[error("expected '{expected}' but found '{found}'")]
    MiscasedKey {
        /// The canonical spelling.
        expected: &'static str,
        /// What the identifier contained.
        found: String,
    },
    /// The same type key appears twice.
    #[error("segment '{0}' appears more than once")]
    DuplicateSegment(String),
    /// A second `providers` segment (extension resources are not supported).
    #[error("nested 'providers' segments are not supported")]
    NestedProvider,
    /// The identifier is well formed but names a different resource type.
    #[error("expected a '{expected}' identifier, found '{found}'")]
    UnexpectedResourceType {
        /// The resource type the caller asked for.
        expected: String,
        /// The resource type the identifier names.
        found: String,
    },
}

/// An identifier that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid resource ID {input:?}: {reason}")]
pub struct ParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: ParseErrorReason,
}

impl ParseError {
    pub(crate) fn new(input: impl Into<String>, reason: ParseErrorReason) -> Self {
        Self {
            input: input.into(),
            reason,
        }
    }
}

/// A structured control-plane resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    subscription_id: String,
    resource_group: String,
    provider_namespace: String,
    segments: Vec<(String, String)>,
}

impl ResourceId {
    /// Build an identifier for a top-level resource.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        provider_namespace: impl Into<String>,
        resource_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            provider_namespace: provider_namespace.into(),
            segments: vec![(resource_type.into(), name.into())],
        }
    }

    /// Append a child `{type}/{name}` segment.
    pub fn child(mut self, resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        self.segments.push((resource_type.into(), name.into()));
        self
    }

    /// Parse an identifier string.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parse_parts(input).map_err(|reason| ParseError::new(input, reason))
    }

    /// The subscription scope.
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// The resource group name.
    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// The provider namespace, e.g. `Microsoft.Network`.
    pub fn provider_namespace(&self) -> &str {
        &self.provider_namespace
    }

    /// The `{type}/{name}` pairs after the namespace, outermost first.
    pub fn segments(&self) -> &[(String, String)] {
        &self.segments
    }

    /// Look up the name for a type key, e.g. `segment("sites")`.
    pub fn segment(&self, key: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The name of the innermost resource.
    pub fn name(&self) -> &str {
        self.segments
            .last()
            .map(|(_, name)| name.as_str())
            .unwrap_or_default()
    }

    /// The full type path, e.g. `Microsoft.Web/sites/hybridConnectionNamespaces/relays`.
    pub fn resource_type(&self) -> String {
        let mut out = self.provider_namespace.clone();
        for (key, _) in &self.segments {
            out.push('/');
            out.push_str(key);
        }
        out
    }

    /// The enclosing resource, if this is a child resource.
    pub fn parent(&self) -> Option<ResourceId> {
        if self.segments.len() < 2 {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    /// Check that this identifier names the given type path.
    pub fn expect_type(&self, expected: &str) -> Result<(), ParseError> {
        let found = self.resource_type();
        if found == expected {
            Ok(())
        } else {
            Err(ParseError::new(
                self.to_string(),
                ParseErrorReason::UnexpectedResourceType {
                    expected: expected.to_string(),
                    found,
                },
            ))
        }
    }
}

fn parse_parts(input: &str) -> Result<ResourceId, ParseErrorReason> {
    let rest = input
        .strip_prefix('/')
        .ok_or(ParseErrorReason::MissingLeadingSlash)?;
    if rest.is_empty() {
        return Err(ParseErrorReason::MissingSubscription);
    }
    if rest.ends_with('/') {
        return Err(ParseErrorReason::TrailingSlash);
    }

    let parts: Vec<&str> = rest.split('/').collect();
    if let Some(index) = parts.iter().position(|p| p.is_empty()) {
        return Err(ParseErrorReason::EmptySegment(index));
    }
    let mut parts = parts.into_iter();

    expect_key(&mut parts, SUBSCRIPTIONS, ParseErrorReason::MissingSubscription)?;
    let subscription_id = expect_value(&mut parts, SUBSCRIPTIONS)?;

    expect_key(
        &mut parts,
        RESOURCE_GROUPS,
        ParseErrorReason::MissingResourceGroup,
    )?;
    let resource_group = expect_value(&mut parts, RESOURCE_GROUPS)?;

    expect_key(&mut parts, PROVIDERS, ParseErrorReason::MissingProviders)?;
    let provider_namespace = expect_value(&mut parts, PROVIDERS)?;
    if !is_valid_namespace(provider_namespace) {
        return Err(ParseErrorReason::InvalidNamespace(
            provider_namespace.to_string(),
        ));
    }

    let mut segments: Vec<(String, String)> = Vec::new();
    while let Some(key) = parts.next() {
        if key.eq_ignore_ascii_case(PROVIDERS) {
            return Err(ParseErrorReason::NestedProvider);
        }
        let value = expect_value(&mut parts, key)?;
        if segments.iter().any(|(k, _)| k == key) {
            return Err(ParseErrorReason::DuplicateSegment(key.to_string()));
        }
        segments.push((key.to_string(), value.to_string()));
    }
    if segments.is_empty() {
        return Err(ParseErrorReason::MissingResourceType);
    }

    Ok(ResourceId {
        subscription_id: subscription_id.to_string(),
        resource_group: resource_group.to_string(),
        provider_namespace: provider_namespace.to_string(),
        segments,
    })
}

fn expect_key<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    key: &'static str,
    missing: ParseErrorReason,
) -> Result<(), ParseErrorReason> {
    match parts.next() {
        Some(found) if found == key => Ok(()),
        Some(found) if found.eq_ignore_ascii_case(key) => Err(ParseErrorReason::MiscasedKey {
            expected: key,
            found: found.to_string(),
        }),
        _ => Err(missing),
    }
}

fn expect_value<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    key: &str,
) -> Result<&'a str, ParseErrorReason> {
    parts
        .next()
        .ok_or_else(|| ParseErrorReason::UnpairedSegment(key.to_string()))
}

fn is_valid_namespace(namespace: &str) -> bool {
    let mut pieces = namespace.split('.');
    let valid_piece = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric());
    match (pieces.next(), pieces.next()) {
        (Some(first), Some(second)) => {
            valid_piece(first) && valid_piece(second) && pieces.all(valid_piece)
        },
        _ => false,
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}/{}/{}/{}/{}/{}",
            SUBSCRIPTIONS,
            self.subscription_id,
            RESOURCE_GROUPS,
            self.resource_group,
            PROVIDERS,
            self.provider_namespace
        )?;
        for (key, value) in &self.segments {
            write!(f, "/{}/{}", key, value)?;
        }
        Ok(())
    }
}

impl FromStr for ResourceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for ResourceId {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "/subscriptions/12345678-1234-9876-4563-123456789012/resourceGroups/acctestRG-1/providers/Microsoft.Network/ddosProtectionPlans/acctestddospplan-1";
    const RELAY: &str = "/subscriptions/0000/resourceGroups/rg/providers/Microsoft.Web/sites/acctestAS-1/hybridConnectionNamespaces/acctestrnhc-1/relays/acctestrnhc-1";

    fn reason(input: &str) -> ParseErrorReason {
        ResourceId::parse(input).unwrap_err().reason
    }

    #[test]
    fn test_parse_top_level() {
        let id = ResourceId::parse(PLAN).unwrap();
        assert_eq!(id.subscription_id(), "12345678-1234-9876-4563-123456789012");
        assert_eq!(id.resource_group(), "acctestRG-1");
        assert_eq!(id.provider_namespace(), "Microsoft.Network");
        assert_eq!(id.segment("ddosProtectionPlans"), Some("acctestddospplan-1"));
        assert_eq!(id.name(), "acctestddospplan-1");
        assert!(id.parent().is_none());
    }

    #[test]
    fn test_parse_child_resource() {
        let id = ResourceId::parse(RELAY).unwrap();
        assert_eq!(id.segments().len(), 3);
        assert_eq!(id.segment("sites"), Some("acctestAS-1"));
        assert_eq!(id.segment("relays"), Some("acctestrnhc-1"));
        assert_eq!(
            id.resource_type(),
            "Microsoft.Web/sites/hybridConnectionNamespaces/relays"
        );

        let parent = id.parent().unwrap();
        assert_eq!(parent.name(), "acctestrnhc-1");
        assert_eq!(
            parent.resource_type(),
            "Microsoft.Web/sites/hybridConnectionNamespaces"
        );
    }

    #[test]
    fn test_round_trip() {
        for raw in [PLAN, RELAY] {
            let id = ResourceId::parse(raw).unwrap();
            assert_eq!(id.to_string(), raw);
            assert_eq!(ResourceId::parse(&id.to_string()).unwrap(), id);
        }
    }

    #[test]
    fn test_builder_matches_parse() {
        let built = ResourceId::new("0000", "rg", "Microsoft.Web", "sites", "acctestAS-1")
            .child("hybridConnectionNamespaces", "acctestrnhc-1")
            .child("relays", "acctestrnhc-1");
        assert_eq!(built, ResourceId::parse(RELAY).unwrap());
        assert_eq!(built.to_string(), RELAY);
    }

    #[test]
    fn test_rejects_structural_errors() {
        assert_eq!(
            reason("subscriptions/0000/resourceGroups/rg/providers/A.B/t/n"),
            ParseErrorReason::MissingLeadingSlash
        );
        assert_eq!(reason("/"), ParseErrorReason::MissingSubscription);
        assert_eq!(
            reason("/subscriptions/0000/resourceGroups/rg/providers/A.B/t/n/"),
            ParseErrorReason::TrailingSlash
        );
        assert_eq!(
            reason("/subscriptions//resourceGroups/rg/providers/A.B/t/n"),
            ParseErrorReason::EmptySegment(1)
        );
        assert_eq!(
            reason("/subscriptions/0000/resourceGroups/rg/providers/A.B/t"),
            ParseErrorReason::UnpairedSegment("t".to_string())
        );
    }

    #[test]
    fn test_rejects_missing_segments() {
        assert_eq!(
            reason("/resourceGroups/rg/subscriptions/0000/providers/A.B/t/n"),
            ParseErrorReason::MissingSubscription
        );
        assert_eq!(
            reason("/subscriptions/0000/providers/A.B/t/n"),
            ParseErrorReason::MissingResourceGroup
        );
        assert_eq!(
            reason("/subscriptions/0000/resourceGroups/rg"),
            ParseErrorReason::MissingProviders
        );
        assert_eq!(
            reason("/subscriptions/0000/resourceGroups/rg/providers/A.B"),
            ParseErrorReason::MissingResourceType
        );
    }

    #[test]
    fn test_rejects_miscased_keys() {
        assert_eq!(
            reason("/subscriptions/0000/resourcegroups/rg/providers/A.B/t/n"),
            ParseErrorReason::MiscasedKey {
                expected: "resourceGroups",
                found: "resourcegroups".to_string(),
            }
        );
        assert_eq!(
            reason("/Subscriptions/0000/resourceGroups/rg/providers/A.B/t/n"),
            ParseErrorReason::MiscasedKey {
                expected: "subscriptions",
                found: "Subscriptions".to_string(),
            }
        );
        assert_eq!(
            reason("/subscriptions/0000/resourceGroups/rg/Providers/A.B/t/n"),
            ParseErrorReason::MiscasedKey {
                expected: "providers",
                found: "Providers".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_bad_namespace_and_duplicates() {
        assert_eq!(
            reason("/subscriptions/0000/resourceGroups/rg/providers/MicrosoftNetwork/t/n"),
            ParseErrorReason::InvalidNamespace("MicrosoftNetwork".to_string())
        );
        assert_eq!(
            reason("/subscriptions/0000/resourceGroups/rg/providers/A.B/t/n/t/m"),
            ParseErrorReason::DuplicateSegment("t".to_string())
        );
        assert_eq!(
            reason("/subscriptions/0000/resourceGroups/rg/providers/A.B/t/n/providers/C.D/u/m"),
            ParseErrorReason::NestedProvider
        );
    }

    #[test]
    fn test_parse_error_display_includes_input() {
        let err = ResourceId::parse("/subscriptions/0000").unwrap_err();
        let display = err.to_string();
        assert!(display.contains("/subscriptions/0000"));
        assert!(display.contains("missing 'resourceGroups' segment"));
    }

    #[test]
    fn test_expect_type() {
        let id = ResourceId::parse(PLAN).unwrap();
        assert!(id.expect_type("Microsoft.Network/ddosProtectionPlans").is_ok());

        let err = id.expect_type("Microsoft.Web/sites").unwrap_err();
        assert!(matches!(
            err.reason,
            ParseErrorReason::UnexpectedResourceType { .. }
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let id = ResourceId::parse(PLAN).unwrap();
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!(PLAN));

        let back: ResourceId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);

        let bad: Result<ResourceId, _> = serde_json::from_value(serde_json::json!("/nope"));
        assert!(bad.is_err());
    }
}
