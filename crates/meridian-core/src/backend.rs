//! Connector backends.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The mechanism implementing a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process adapter with native protocol logic.
    Native,
    /// Externally-hosted tool registry reached over the remote tool bus.
    Mcp,
    /// Out-of-process plugin host.
    Plugin,
}

impl Backend {
    /// The closed set of backends.
    pub const ALL: [Self; 3] = [Self::Native, Self::Mcp, Self::Plugin];

    /// Default preference order used when neither the request nor the policy
    /// narrows it: native first, then the remote bus, then plugins.
    pub const DEFAULT_ORDER: [Self; 3] = [Self::Native, Self::Mcp, Self::Plugin];

    /// The wire name for this backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Mcp => "mcp",
            Self::Plugin => "plugin",
        }
    }

    /// Position of this backend in [`Backend::DEFAULT_ORDER`].
    #[must_use]
    pub fn default_rank(self) -> usize {
        Self::DEFAULT_ORDER
            .iter()
            .position(|b| *b == self)
            .unwrap_or(Self::DEFAULT_ORDER.len())
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backend: {0}")]
pub struct UnknownBackend(pub String);

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(Self::Native),
            "mcp" => Ok(Self::Mcp),
            "plugin" => Ok(Self::Plugin),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rank_order() {
        assert!(Backend::Native.default_rank() < Backend::Mcp.default_rank());
        assert!(Backend::Mcp.default_rank() < Backend::Plugin.default_rank());
    }

    #[test]
    fn test_parse_round_trip() {
        for b in Backend::ALL {
            assert_eq!(b.as_str().parse::<Backend>().unwrap(), b);
        }
        assert!("grpc".parse::<Backend>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Backend::Mcp).unwrap(), "\"mcp\"");
    }
}
