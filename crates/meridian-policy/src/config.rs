//! Policy configuration and its normalisation.
//!
//! A [`PolicyConfig`] arrives from persistence or callers in arbitrary
//! shape; [`PolicyConfig::normalized`] clamps timeouts and retries into the
//! permitted ranges, deduplicates backend and capability lists, and trims
//! string sets. Normalisation is idempotent: a normalised config equals
//! itself after re-normalisation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use meridian_core::{
    Backend, Capability, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS, IntegrationId, clamp_retries,
    clamp_timeout_ms,
};

/// When a gated capability may run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// No approval gate; the capability always runs.
    #[default]
    Always,
    /// A session approval within the same chat covers repeated use.
    Session,
    /// Each use consumes one previously granted approval.
    Once,
}

impl ApprovalMode {
    /// The wire name for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Session => "session",
            Self::Once => "once",
        }
    }
}

impl std::fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-capability policy overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapabilityPolicy {
    /// `Some(false)` disables the capability outright.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Explicit approval mode; overrides the sensitive-capability default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_mode: Option<ApprovalMode>,
    /// Explicit attempt time budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Explicit retry budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Explicit backend allowlist; also opts the capability out of strict
    /// mode's native-only narrowing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_backends: Option<Vec<Backend>>,
}

/// Per-integration policy overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationPolicy {
    /// `Some(false)` disables every capability of the integration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Capability-level overrides.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub capabilities: BTreeMap<Capability, CapabilityPolicy>,
}

/// The connector policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyConfig {
    /// Master switch. When `false`, every request is allowed with the full
    /// backend set.
    pub enabled: bool,
    /// When set, capabilities without an explicit backend allowlist are
    /// narrowed to the native backend.
    pub strict_mode: bool,
    /// Approval mode applied to sensitive capabilities without an explicit
    /// one.
    pub default_approval_mode: ApprovalMode,
    /// Attempt time budget applied when no override exists.
    pub default_timeout_ms: u64,
    /// Retry budget applied when no override exists.
    pub default_max_retries: u32,
    /// Backends allowed when no capability-level list exists.
    pub default_allowed_backends: Vec<Backend>,
    /// Backends denied everywhere, subtracted after allowlists resolve.
    pub backend_denylist: Vec<Backend>,
    /// Capabilities gated behind the default approval mode.
    pub sensitive_capabilities: Vec<Capability>,
    /// Remote tool names the remote adapter must treat as undiscovered.
    pub blocked_remote_tool_names: Vec<String>,
    /// Per-integration overrides.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub integration_policies: BTreeMap<IntegrationId, IntegrationPolicy>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict_mode: false,
            default_approval_mode: ApprovalMode::Always,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            default_max_retries: DEFAULT_MAX_RETRIES,
            default_allowed_backends: Backend::ALL.to_vec(),
            backend_denylist: Vec::new(),
            sensitive_capabilities: Vec::new(),
            blocked_remote_tool_names: Vec::new(),
            integration_policies: BTreeMap::new(),
        }
    }
}

impl PolicyConfig {
    /// Return this config with every field normalised.
    ///
    /// Clamps timeouts and retries, deduplicates backend lists preserving
    /// first-seen order, trims and sorts the capability and tool-name sets,
    /// and recurses into integration policies. Idempotent.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.default_timeout_ms = clamp_timeout_ms(self.default_timeout_ms);
        self.default_max_retries = clamp_retries(self.default_max_retries);
        dedup_backends(&mut self.default_allowed_backends);
        dedup_backends(&mut self.backend_denylist);

        self.sensitive_capabilities = normalize_string_set(
            self.sensitive_capabilities.iter().map(Capability::as_str),
        )
        .into_iter()
        .map(Capability::new)
        .collect();

        self.blocked_remote_tool_names =
            normalize_string_set(self.blocked_remote_tool_names.iter().map(String::as_str));

        for integration in self.integration_policies.values_mut() {
            for capability in integration.capabilities.values_mut() {
                if let Some(timeout_ms) = capability.timeout_ms {
                    capability.timeout_ms = Some(clamp_timeout_ms(timeout_ms));
                }
                if let Some(max_retries) = capability.max_retries {
                    capability.max_retries = Some(clamp_retries(max_retries));
                }
                if let Some(backends) = capability.allowed_backends.as_mut() {
                    dedup_backends(backends);
                    // An explicitly empty allowlist carries no information;
                    // treat it as unset so defaults and strict mode apply.
                    if backends.is_empty() {
                        capability.allowed_backends = None;
                    }
                }
            }
        }

        self
    }

    /// Look up the policy for one capability, if configured.
    #[must_use]
    pub fn capability_policy(
        &self,
        integration_id: IntegrationId,
        capability: &Capability,
    ) -> Option<&CapabilityPolicy> {
        self.integration_policies
            .get(&integration_id)?
            .capabilities
            .get(capability)
    }
}

/// Deduplicate backends preserving first-seen order.
fn dedup_backends(backends: &mut Vec<Backend>) {
    let mut seen = Vec::with_capacity(backends.len());
    backends.retain(|b| {
        if seen.contains(b) {
            false
        } else {
            seen.push(*b);
            true
        }
    });
}

/// Trim, drop empties, deduplicate, and sort a string set.
fn normalize_string_set<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = values
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    out.sort();
    out.dedup();
    out
}
