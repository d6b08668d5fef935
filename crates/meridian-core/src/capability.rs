//! Capability names and routing keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::integration::IntegrationId;

/// A named operation exposed by one or more integrations.
///
/// Capabilities are opaque dotted strings (`catalog.search`, `sql.query`).
/// The core never interprets the segments; adapters match on the whole name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// Wrap a capability name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The capability name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Capability {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A routing key: one integration paired with one capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityKey {
    /// The integration this key belongs to.
    pub integration_id: IntegrationId,
    /// The capability name.
    pub capability: Capability,
}

impl CapabilityKey {
    /// Build a routing key.
    #[must_use]
    pub fn new(integration_id: IntegrationId, capability: impl Into<Capability>) -> Self {
        Self {
            integration_id,
            capability: capability.into(),
        }
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.integration_id, self.capability)
    }
}
