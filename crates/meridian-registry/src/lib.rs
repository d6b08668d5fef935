//! Meridian Registry - ordered routing table for connector capabilities.
//!
//! The [`CapabilityRegistry`] maps `(integration, capability)` keys to an
//! ordered list of [`Route`]s across backends. Registration is append-only;
//! ordering is deterministic given the same registrations: default backend
//! order, then ascending priority, then registration order.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use meridian_core::{Backend, Capability, CapabilityKey, ConnectorAdapter, IntegrationId};

/// Priority assigned to routes registered without one.
pub const DEFAULT_PRIORITY: u32 = 100;

/// Whether invoking a route warrants the approval flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// No approval needed beyond the capability policy.
    #[default]
    Normal,
    /// The capability touches data the policy may gate behind approvals.
    Sensitive,
}

/// One backend binding for a routing key.
#[derive(Clone)]
pub struct Route {
    /// The integration this route serves.
    pub integration_id: IntegrationId,
    /// The capability this route serves.
    pub capability: Capability,
    /// The executable for this route.
    pub adapter: Arc<dyn ConnectorAdapter>,
    /// Human-readable description for capability listings.
    pub description: Option<String>,
    /// Route sensitivity.
    pub sensitivity: Sensitivity,
    /// Lower wins within the same backend.
    pub priority: u32,
}

impl Route {
    /// The routing key of this route.
    #[must_use]
    pub fn key(&self) -> CapabilityKey {
        CapabilityKey::new(self.integration_id, self.capability.clone())
    }

    /// The backend of the underlying adapter.
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.adapter.backend()
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("key", &self.key().to_string())
            .field("adapter", &self.adapter.id())
            .field("backend", &self.backend())
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Input to [`CapabilityRegistry::register`].
pub struct RouteRegistration {
    /// The integration the route serves.
    pub integration_id: IntegrationId,
    /// The capability the route serves.
    pub capability: Capability,
    /// The executable for the route.
    pub adapter: Arc<dyn ConnectorAdapter>,
    /// Human-readable description for capability listings.
    pub description: Option<String>,
    /// Route sensitivity. Defaults to [`Sensitivity::Normal`].
    pub sensitivity: Option<Sensitivity>,
    /// Route priority. Defaults to [`DEFAULT_PRIORITY`].
    pub priority: Option<u32>,
}

/// Aggregate view of one routing key across its routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySummary {
    /// The integration.
    pub integration_id: IntegrationId,
    /// The capability.
    pub capability: Capability,
    /// Distinct backends serving the key, in route order.
    pub backends: Vec<Backend>,
    /// Sensitive iff any route for the key is sensitive.
    pub sensitivity: Sensitivity,
    /// First non-empty description across routes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Ordered routing table keyed by `(integration, capability)`.
///
/// Route lists may be read concurrently with appends; the table sits behind
/// a read-write lock and `resolve` snapshots the matching list.
#[derive(Default)]
pub struct CapabilityRegistry {
    routes: RwLock<HashMap<CapabilityKey, Vec<Route>>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route and re-sort its key's route list.
    ///
    /// Duplicate (adapter, key) pairs are allowed; callers are responsible
    /// for not registering logical duplicates.
    pub fn register(&self, registration: RouteRegistration) {
        let route = Route {
            integration_id: registration.integration_id,
            capability: registration.capability,
            adapter: registration.adapter,
            description: registration.description,
            sensitivity: registration.sensitivity.unwrap_or_default(),
            priority: registration.priority.unwrap_or(DEFAULT_PRIORITY),
        };
        let key = route.key();

        tracing::debug!(
            key = %key,
            adapter = route.adapter.id(),
            backend = %route.backend(),
            priority = route.priority,
            "registering connector route"
        );

        let mut routes = self.routes.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let list = routes.entry(key).or_default();
        list.push(route);
        // Stable sort keeps registration order as the final tie-break.
        list.sort_by_key(|r| (r.backend().default_rank(), r.priority));
    }

    /// Resolve the ordered routes for a key.
    ///
    /// Routes whose backend is denied, and routes whose adapter does not
    /// support the key, are dropped. When `preferred_backends` is non-empty,
    /// routes on a preferred backend precede the rest, in the listed order;
    /// everything else keeps the default order (backend rank, then priority).
    #[must_use]
    pub fn resolve(
        &self,
        integration_id: IntegrationId,
        capability: &Capability,
        preferred_backends: Option<&[Backend]>,
        denied_backends: Option<&[Backend]>,
    ) -> Vec<Route> {
        let key = CapabilityKey::new(integration_id, capability.clone());
        let routes = self.routes.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(list) = routes.get(&key) else {
            return Vec::new();
        };

        let denied = denied_backends.unwrap_or(&[]);
        let mut resolved: Vec<Route> = list
            .iter()
            .filter(|r| !denied.contains(&r.backend()))
            .filter(|r| r.adapter.supports(&key))
            .cloned()
            .collect();

        if let Some(preferred) = preferred_backends {
            if !preferred.is_empty() {
                // Stable: preferred backends float to the front in listed
                // order; everything else keeps the default ordering.
                resolved.sort_by_key(|r| {
                    preferred
                        .iter()
                        .position(|b| *b == r.backend())
                        .unwrap_or(usize::MAX)
                });
            }
        }

        resolved
    }

    /// One aggregate per key, sorted by integration then capability.
    #[must_use]
    pub fn list_capabilities(&self) -> Vec<CapabilitySummary> {
        let routes = self.routes.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut summaries: Vec<CapabilitySummary> = routes
            .iter()
            .map(|(key, list)| {
                let mut backends = Vec::new();
                for route in list {
                    if !backends.contains(&route.backend()) {
                        backends.push(route.backend());
                    }
                }
                let sensitivity = if list.iter().any(|r| r.sensitivity == Sensitivity::Sensitive) {
                    Sensitivity::Sensitive
                } else {
                    Sensitivity::Normal
                };
                let description = list
                    .iter()
                    .filter_map(|r| r.description.as_deref())
                    .find(|d| !d.is_empty())
                    .map(String::from);
                CapabilitySummary {
                    integration_id: key.integration_id,
                    capability: key.capability.clone(),
                    backends,
                    sensitivity,
                    description,
                }
            })
            .collect();

        summaries.sort_by(|a, b| {
            (a.integration_id, &a.capability).cmp(&(b.integration_id, &b.capability))
        });
        summaries
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .routes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len();
        f.debug_struct("CapabilityRegistry")
            .field("keys", &count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use meridian_core::{AdapterContext, AdapterResult, ExecutionRequest};

    struct StubAdapter {
        id: String,
        backend: Backend,
        supports: bool,
    }

    impl StubAdapter {
        fn new(id: &str, backend: Backend) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                backend,
                supports: true,
            })
        }

        fn unsupported(id: &str, backend: Backend) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                backend,
                supports: false,
            })
        }
    }

    #[async_trait]
    impl ConnectorAdapter for StubAdapter {
        fn id(&self) -> &str {
            &self.id
        }

        fn backend(&self) -> Backend {
            self.backend
        }

        fn supports(&self, _key: &CapabilityKey) -> bool {
            self.supports
        }

        async fn execute(&self, _req: &ExecutionRequest, _ctx: &AdapterContext) -> AdapterResult {
            AdapterResult::success(serde_json::json!({}))
        }
    }

    fn registration(
        adapter: Arc<StubAdapter>,
        priority: Option<u32>,
        description: Option<&str>,
    ) -> RouteRegistration {
        RouteRegistration {
            integration_id: IntegrationId::Stac,
            capability: Capability::new("catalog.search"),
            adapter,
            description: description.map(String::from),
            sensitivity: None,
            priority,
        }
    }

    #[test]
    fn test_default_order_native_before_mcp() {
        let registry = CapabilityRegistry::new();
        registry.register(registration(StubAdapter::new("mcp", Backend::Mcp), Some(10), None));
        registry.register(registration(
            StubAdapter::new("native", Backend::Native),
            Some(90),
            None,
        ));

        let routes = registry.resolve(
            IntegrationId::Stac,
            &Capability::new("catalog.search"),
            None,
            None,
        );
        let ids: Vec<&str> = routes.iter().map(|r| r.adapter.id()).collect();
        // Backend rank dominates priority.
        assert_eq!(ids, vec!["native", "mcp"]);
    }

    #[test]
    fn test_priority_orders_within_backend() {
        let registry = CapabilityRegistry::new();
        registry.register(registration(StubAdapter::new("b", Backend::Native), Some(50), None));
        registry.register(registration(StubAdapter::new("a", Backend::Native), Some(10), None));

        let routes = registry.resolve(
            IntegrationId::Stac,
            &Capability::new("catalog.search"),
            None,
            None,
        );
        let ids: Vec<&str> = routes.iter().map(|r| r.adapter.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_priority_tie_keeps_registration_order() {
        let registry = CapabilityRegistry::new();
        registry.register(registration(StubAdapter::new("first", Backend::Native), None, None));
        registry.register(registration(StubAdapter::new("second", Backend::Native), None, None));

        let routes = registry.resolve(
            IntegrationId::Stac,
            &Capability::new("catalog.search"),
            None,
            None,
        );
        let ids: Vec<&str> = routes.iter().map(|r| r.adapter.id()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn test_preferred_backends_float_to_front() {
        let registry = CapabilityRegistry::new();
        registry.register(registration(StubAdapter::new("native", Backend::Native), None, None));
        registry.register(registration(StubAdapter::new("mcp", Backend::Mcp), None, None));

        let routes = registry.resolve(
            IntegrationId::Stac,
            &Capability::new("catalog.search"),
            Some(&[Backend::Mcp]),
            None,
        );
        let ids: Vec<&str> = routes.iter().map(|r| r.adapter.id()).collect();
        assert_eq!(ids, vec!["mcp", "native"]);
    }

    #[test]
    fn test_denied_backends_filtered() {
        let registry = CapabilityRegistry::new();
        registry.register(registration(StubAdapter::new("native", Backend::Native), None, None));
        registry.register(registration(StubAdapter::new("mcp", Backend::Mcp), None, None));

        let routes = registry.resolve(
            IntegrationId::Stac,
            &Capability::new("catalog.search"),
            None,
            Some(&[Backend::Native]),
        );
        let ids: Vec<&str> = routes.iter().map(|r| r.adapter.id()).collect();
        assert_eq!(ids, vec!["mcp"]);
    }

    #[test]
    fn test_unsupported_adapter_never_resolves() {
        let registry = CapabilityRegistry::new();
        registry.register(registration(
            StubAdapter::unsupported("nope", Backend::Native),
            None,
            None,
        ));

        let routes = registry.resolve(
            IntegrationId::Stac,
            &Capability::new("catalog.search"),
            None,
            None,
        );
        assert!(routes.is_empty());
    }

    #[test]
    fn test_unknown_key_resolves_empty() {
        let registry = CapabilityRegistry::new();
        let routes = registry.resolve(
            IntegrationId::S3,
            &Capability::new("storage.list"),
            None,
            None,
        );
        assert!(routes.is_empty());
    }

    #[test]
    fn test_list_capabilities_aggregates() {
        let registry = CapabilityRegistry::new();
        registry.register(RouteRegistration {
            integration_id: IntegrationId::Stac,
            capability: Capability::new("catalog.search"),
            adapter: StubAdapter::new("native", Backend::Native),
            description: None,
            sensitivity: None,
            priority: Some(10),
        });
        registry.register(RouteRegistration {
            integration_id: IntegrationId::Stac,
            capability: Capability::new("catalog.search"),
            adapter: StubAdapter::new("mcp", Backend::Mcp),
            description: Some("Search a STAC catalog via the tool bus".to_string()),
            sensitivity: Some(Sensitivity::Sensitive),
            priority: Some(80),
        });

        let summaries = registry.list_capabilities();
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.backends, vec![Backend::Native, Backend::Mcp]);
        assert_eq!(summary.sensitivity, Sensitivity::Sensitive);
        assert_eq!(
            summary.description.as_deref(),
            Some("Search a STAC catalog via the tool bus")
        );
    }
}
