//! Policy evaluation.
//!
//! [`PolicyService`] owns the approval store and reads the persisted policy
//! document through the [`PolicyStore`] collaborator. `evaluate` produces a
//! [`PolicyDecision`] carrying the allowed backends, approval mode, and
//! timing budgets — for denials too, so callers can prompt the user and
//! retry.

use std::sync::Arc;

use async_trait::async_trait;

use meridian_core::{Backend, Capability, IntegrationId};

use crate::approvals::{ApprovalStore, GLOBAL_SCOPE};
use crate::config::{ApprovalMode, PolicyConfig};
use crate::error::PolicyResult;

/// Persistence collaborator for the policy document.
///
/// Implementations live outside the core (a settings row in the host
/// application); tests use [`MemoryPolicyStore`].
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Load the persisted policy document, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying store fails; the service treats
    /// that as "no document" and falls back to defaults.
    async fn get_connector_policy_config(&self) -> PolicyResult<Option<PolicyConfig>>;

    /// Persist the policy document.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying store fails.
    async fn set_connector_policy_config(&self, config: &PolicyConfig) -> PolicyResult<()>;
}

/// In-memory [`PolicyStore`] for tests and ephemeral processes.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    config: std::sync::Mutex<Option<PolicyConfig>>,
}

impl MemoryPolicyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a document.
    #[must_use]
    pub fn with_config(config: PolicyConfig) -> Self {
        Self {
            config: std::sync::Mutex::new(Some(config)),
        }
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn get_connector_policy_config(&self) -> PolicyResult<Option<PolicyConfig>> {
        Ok(self
            .config
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    async fn set_connector_policy_config(&self, config: &PolicyConfig) -> PolicyResult<()> {
        *self
            .config
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(config.clone());
        Ok(())
    }
}

/// One policy question: may this capability run, and with what budgets?
#[derive(Debug, Clone)]
pub struct PolicyQuery {
    /// Target integration.
    pub integration_id: IntegrationId,
    /// Requested capability.
    pub capability: Capability,
    /// Chat scope for approval lookups.
    pub chat_id: Option<String>,
}

/// The outcome of one evaluation.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Denial reason; `None` when allowed.
    pub reason: Option<String>,
    /// Backends the request may use, in preference order.
    pub allowed_backends: Vec<Backend>,
    /// Resolved approval mode.
    pub approval_mode: ApprovalMode,
    /// Resolved attempt time budget.
    pub timeout_ms: u64,
    /// Resolved retry budget.
    pub max_retries: u32,
}

impl PolicyDecision {
    fn allow(
        allowed_backends: Vec<Backend>,
        approval_mode: ApprovalMode,
        timeout_ms: u64,
        max_retries: u32,
    ) -> Self {
        Self {
            allowed: true,
            reason: None,
            allowed_backends,
            approval_mode,
            timeout_ms,
            max_retries,
        }
    }

    fn deny(
        reason: impl Into<String>,
        allowed_backends: Vec<Backend>,
        approval_mode: ApprovalMode,
        timeout_ms: u64,
        max_retries: u32,
    ) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            allowed_backends,
            approval_mode,
            timeout_ms,
            max_retries,
        }
    }
}

/// Evaluates per-integration and per-capability rules, including the
/// sensitive-capability approval flow.
pub struct PolicyService {
    store: Arc<dyn PolicyStore>,
    approvals: ApprovalStore,
}

impl PolicyService {
    /// Create a service backed by the given persistence collaborator.
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            store,
            approvals: ApprovalStore::new(),
        }
    }

    /// The normalised policy document; defaults when none is persisted or
    /// the store fails.
    pub async fn get_policy_config(&self) -> PolicyConfig {
        match self.store.get_connector_policy_config().await {
            Ok(Some(config)) => config.normalized(),
            Ok(None) => PolicyConfig::default().normalized(),
            Err(e) => {
                tracing::warn!("failed to load connector policy, using defaults: {e}");
                PolicyConfig::default().normalized()
            },
        }
    }

    /// Normalise and persist a policy document, returning the stored form.
    ///
    /// # Errors
    ///
    /// Returns an error when the persistence collaborator fails.
    pub async fn set_policy_config(&self, config: PolicyConfig) -> PolicyResult<PolicyConfig> {
        let config = config.normalized();
        self.store.set_connector_policy_config(&config).await?;
        Ok(config)
    }

    /// Evaluate one request against the policy and the approval store.
    pub async fn evaluate(&self, query: &PolicyQuery) -> PolicyDecision {
        let config = self.get_policy_config().await;
        let integration = query.integration_id;
        let capability = &query.capability;

        // 1. Master switch off: everything is allowed on the full set.
        if !config.enabled {
            return PolicyDecision::allow(
                Backend::ALL.to_vec(),
                ApprovalMode::Always,
                config.default_timeout_ms,
                config.default_max_retries,
            );
        }

        let integration_policy = config.integration_policies.get(&integration);
        let capability_policy =
            integration_policy.and_then(|ip| ip.capabilities.get(capability));

        // 2. Integration disabled.
        if integration_policy.and_then(|ip| ip.enabled) == Some(false) {
            return PolicyDecision::deny(
                format!("Integration {integration} is disabled by policy"),
                Vec::new(),
                ApprovalMode::Always,
                config.default_timeout_ms,
                config.default_max_retries,
            );
        }

        // 3. Capability disabled.
        if capability_policy.and_then(|cp| cp.enabled) == Some(false) {
            return PolicyDecision::deny(
                format!("Capability {capability} is disabled by policy"),
                Vec::new(),
                ApprovalMode::Always,
                config.default_timeout_ms,
                config.default_max_retries,
            );
        }

        // 4. Resolve the backend set: capability allowlist, else defaults;
        //    strict mode narrows implicit sets to native; the denylist is
        //    subtracted last.
        let explicit_backends = capability_policy.and_then(|cp| cp.allowed_backends.clone());
        let mut allowed_backends = match explicit_backends {
            Some(backends) => backends,
            None if config.strict_mode => vec![Backend::Native],
            None => config.default_allowed_backends.clone(),
        };
        allowed_backends.retain(|b| !config.backend_denylist.contains(b));

        let timeout_ms = capability_policy
            .and_then(|cp| cp.timeout_ms)
            .unwrap_or(config.default_timeout_ms);
        let max_retries = capability_policy
            .and_then(|cp| cp.max_retries)
            .unwrap_or(config.default_max_retries);

        if allowed_backends.is_empty() {
            return PolicyDecision::deny(
                format!("No connector backend is allowed for {integration}/{capability}"),
                Vec::new(),
                ApprovalMode::Always,
                timeout_ms,
                max_retries,
            );
        }

        // 5. Resolve the approval mode: explicit, else sensitive default.
        let approval_mode = capability_policy
            .and_then(|cp| cp.approval_mode)
            .unwrap_or_else(|| {
                if config.sensitive_capabilities.contains(capability) {
                    config.default_approval_mode
                } else {
                    ApprovalMode::Always
                }
            });

        // 6. Consult the approval store for gated modes. Denials still carry
        //    the resolved backends and timings so the caller can prompt.
        let approved = match approval_mode {
            ApprovalMode::Always => true,
            ApprovalMode::Session => {
                let scope = query.chat_id.as_deref().unwrap_or(GLOBAL_SCOPE);
                self.approvals.has_session(scope, integration, capability)
            },
            ApprovalMode::Once => self.approvals.consume_one_time(
                query.chat_id.as_deref(),
                integration,
                capability,
            ),
        };

        if !approved {
            tracing::debug!(
                integration = %integration,
                capability = %capability,
                mode = %approval_mode,
                "approval missing for gated capability"
            );
            return PolicyDecision::deny(
                format!("Approval required for {integration}/{capability} (mode: {approval_mode})"),
                allowed_backends,
                approval_mode,
                timeout_ms,
                max_retries,
            );
        }

        PolicyDecision::allow(allowed_backends, approval_mode, timeout_ms, max_retries)
    }

    /// The approval store.
    #[must_use]
    pub fn approvals(&self) -> &ApprovalStore {
        &self.approvals
    }

    /// Grant a session approval. No-op when `chat_id` is empty/whitespace.
    pub fn grant_session_approval(
        &self,
        chat_id: &str,
        integration_id: IntegrationId,
        capability: &Capability,
    ) {
        self.approvals.grant_session(chat_id, integration_id, capability);
    }

    /// Grant one one-shot approval, chat-scoped when a chat id is given.
    pub fn grant_one_time_approval(
        &self,
        chat_id: Option<&str>,
        integration_id: IntegrationId,
        capability: &Capability,
    ) {
        self.approvals.grant_one_time(chat_id, integration_id, capability);
    }

    /// Clear approvals: all of them, or one chat's.
    pub fn clear_session_approvals(&self, chat_id: Option<&str>) {
        self.approvals.clear(chat_id);
    }
}

impl std::fmt::Debug for PolicyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapabilityPolicy, IntegrationPolicy};
    use std::collections::BTreeMap;

    fn service_with(config: PolicyConfig) -> PolicyService {
        PolicyService::new(Arc::new(MemoryPolicyStore::with_config(config)))
    }

    fn query(integration: IntegrationId, capability: &str) -> PolicyQuery {
        PolicyQuery {
            integration_id: integration,
            capability: Capability::new(capability),
            chat_id: Some("chat-1".to_string()),
        }
    }

    fn integration_policy(enabled: Option<bool>) -> IntegrationPolicy {
        IntegrationPolicy {
            enabled,
            capabilities: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_disabled_policy_allows_everything() {
        let service = service_with(PolicyConfig {
            enabled: false,
            ..PolicyConfig::default()
        });
        let decision = service.evaluate(&query(IntegrationId::S3, "storage.list")).await;
        assert!(decision.allowed);
        assert_eq!(decision.allowed_backends, Backend::ALL.to_vec());
        assert_eq!(decision.approval_mode, ApprovalMode::Always);
    }

    #[tokio::test]
    async fn test_disabled_integration_denied() {
        let mut integration_policies = BTreeMap::new();
        integration_policies.insert(IntegrationId::S3, integration_policy(Some(false)));
        let service = service_with(PolicyConfig {
            integration_policies,
            ..PolicyConfig::default()
        });

        let decision = service.evaluate(&query(IntegrationId::S3, "storage.list")).await;
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason.as_deref(),
            Some("Integration s3 is disabled by policy")
        );
    }

    #[tokio::test]
    async fn test_disabled_capability_denied() {
        let mut capabilities = BTreeMap::new();
        capabilities.insert(
            Capability::new("sql.query"),
            CapabilityPolicy {
                enabled: Some(false),
                ..CapabilityPolicy::default()
            },
        );
        let mut integration_policies = BTreeMap::new();
        integration_policies.insert(
            IntegrationId::PostgresqlPostgis,
            IntegrationPolicy {
                enabled: None,
                capabilities,
            },
        );
        let service = service_with(PolicyConfig {
            integration_policies,
            ..PolicyConfig::default()
        });

        let decision = service
            .evaluate(&query(IntegrationId::PostgresqlPostgis, "sql.query"))
            .await;
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason.as_deref(),
            Some("Capability sql.query is disabled by policy")
        );
    }

    #[tokio::test]
    async fn test_strict_mode_narrows_to_native() {
        let service = service_with(PolicyConfig {
            strict_mode: true,
            ..PolicyConfig::default()
        });
        let decision = service.evaluate(&query(IntegrationId::Stac, "catalog.search")).await;
        assert!(decision.allowed);
        assert_eq!(decision.allowed_backends, vec![Backend::Native]);
    }

    #[tokio::test]
    async fn test_strict_mode_respects_explicit_backends() {
        let mut capabilities = BTreeMap::new();
        capabilities.insert(
            Capability::new("catalog.search"),
            CapabilityPolicy {
                allowed_backends: Some(vec![Backend::Mcp]),
                ..CapabilityPolicy::default()
            },
        );
        let mut integration_policies = BTreeMap::new();
        integration_policies.insert(
            IntegrationId::Stac,
            IntegrationPolicy {
                enabled: None,
                capabilities,
            },
        );
        let service = service_with(PolicyConfig {
            strict_mode: true,
            integration_policies,
            ..PolicyConfig::default()
        });

        let decision = service.evaluate(&query(IntegrationId::Stac, "catalog.search")).await;
        assert!(decision.allowed);
        assert_eq!(decision.allowed_backends, vec![Backend::Mcp]);
    }

    #[tokio::test]
    async fn test_denylist_empties_set() {
        let service = service_with(PolicyConfig {
            backend_denylist: Backend::ALL.to_vec(),
            ..PolicyConfig::default()
        });
        let decision = service.evaluate(&query(IntegrationId::Stac, "catalog.search")).await;
        assert!(!decision.allowed);
        assert!(
            decision
                .reason
                .as_deref()
                .unwrap()
                .starts_with("No connector backend is allowed")
        );
    }

    #[tokio::test]
    async fn test_sensitive_capability_requires_approval() {
        let service = service_with(PolicyConfig {
            default_approval_mode: ApprovalMode::Session,
            sensitive_capabilities: vec![Capability::new("sql.query")],
            ..PolicyConfig::default()
        });

        let q = query(IntegrationId::PostgresqlPostgis, "sql.query");
        let decision = service.evaluate(&q).await;
        assert!(!decision.allowed);
        let reason = decision.reason.as_deref().unwrap();
        assert!(reason.contains("Approval required"));
        assert!(reason.contains("(mode: session)"));
        // The denial still carries usable budgets for a later retry.
        assert!(!decision.allowed_backends.is_empty());

        // Granting a session approval flips the decision, repeatedly.
        service.grant_session_approval(
            "chat-1",
            IntegrationId::PostgresqlPostgis,
            &Capability::new("sql.query"),
        );
        assert!(service.evaluate(&q).await.allowed);
        assert!(service.evaluate(&q).await.allowed);

        // Clearing the chat's approvals re-gates it.
        service.clear_session_approvals(Some("chat-1"));
        assert!(!service.evaluate(&q).await.allowed);
    }

    #[tokio::test]
    async fn test_once_approval_consumed() {
        let service = service_with(PolicyConfig {
            default_approval_mode: ApprovalMode::Once,
            sensitive_capabilities: vec![Capability::new("sql.query")],
            ..PolicyConfig::default()
        });

        let q = query(IntegrationId::PostgresqlPostgis, "sql.query");
        service.grant_one_time_approval(
            Some("chat-1"),
            IntegrationId::PostgresqlPostgis,
            &Capability::new("sql.query"),
        );
        assert!(service.evaluate(&q).await.allowed);
        // Consumed: a second identical call denies.
        assert!(!service.evaluate(&q).await.allowed);
    }

    #[tokio::test]
    async fn test_never_allows_with_empty_backends() {
        let service = service_with(PolicyConfig::default());
        let decision = service.evaluate(&query(IntegrationId::Cog, "raster.inspectMetadata")).await;
        assert!(decision.allowed);
        assert!(!decision.allowed_backends.is_empty());
    }

    #[tokio::test]
    async fn test_store_error_falls_back_to_defaults() {
        struct FailingStore;

        #[async_trait]
        impl PolicyStore for FailingStore {
            async fn get_connector_policy_config(&self) -> PolicyResult<Option<PolicyConfig>> {
                Err(crate::error::PolicyError::Store("boom".to_string()))
            }

            async fn set_connector_policy_config(&self, _config: &PolicyConfig) -> PolicyResult<()> {
                Err(crate::error::PolicyError::Store("boom".to_string()))
            }
        }

        let service = PolicyService::new(Arc::new(FailingStore));
        let config = service.get_policy_config().await;
        assert_eq!(config, PolicyConfig::default().normalized());
        let decision = service.evaluate(&query(IntegrationId::S3, "storage.list")).await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_set_policy_config_normalises() {
        let service = service_with(PolicyConfig::default());
        let stored = service
            .set_policy_config(PolicyConfig {
                default_timeout_ms: 1,
                ..PolicyConfig::default()
            })
            .await
            .unwrap();
        assert_eq!(stored.default_timeout_ms, meridian_core::MIN_TIMEOUT_MS);
        assert_eq!(service.get_policy_config().await, stored);
    }
}
