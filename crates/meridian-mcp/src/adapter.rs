//! The remote backend adapter.
//!
//! A static table maps each `(integration, capability)` key to a named tool
//! on the remote bus, optionally pinned to one server. Discovery state is
//! queried per call; ambiguity and absence map to the remote error codes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use meridian_core::{
    AdapterContext, AdapterResult, Backend, Capability, CapabilityKey, ConnectorAdapter,
    ErrorCode, ExecutionRequest, IntegrationId,
};
use meridian_policy::PolicyService;

use crate::bus::{DiscoveredTool, RemoteToolBus};

/// One row of the remote routing table.
#[derive(Debug, Clone)]
pub struct RemoteToolMapping {
    /// The integration the mapping serves.
    pub integration_id: IntegrationId,
    /// The capability the mapping serves.
    pub capability: Capability,
    /// Name of the tool on the bus.
    pub tool_name: String,
    /// When set, only this server may serve the tool.
    pub server_id: Option<String>,
}

impl RemoteToolMapping {
    fn new(integration_id: IntegrationId, capability: &str, tool_name: &str) -> Self {
        Self {
            integration_id,
            capability: Capability::new(capability),
            tool_name: tool_name.to_string(),
            server_id: None,
        }
    }
}

/// The default remote routing table: one tool per native capability.
#[must_use]
pub fn default_mappings() -> Vec<RemoteToolMapping> {
    vec![
        RemoteToolMapping::new(IntegrationId::PostgresqlPostgis, "sql.query", "postgis_query_sql"),
        RemoteToolMapping::new(IntegrationId::Stac, "catalog.search", "stac_search_catalog"),
        RemoteToolMapping::new(
            IntegrationId::Cog,
            "raster.inspectMetadata",
            "cog_inspect_raster_metadata",
        ),
        RemoteToolMapping::new(
            IntegrationId::Pmtiles,
            "tiles.inspectArchive",
            "pmtiles_inspect_tile_archive",
        ),
        RemoteToolMapping::new(IntegrationId::Wms, "tiles.getCapabilities", "wms_get_tile_capabilities"),
        RemoteToolMapping::new(
            IntegrationId::Wmts,
            "tiles.getCapabilities",
            "wmts_get_tile_capabilities",
        ),
        RemoteToolMapping::new(IntegrationId::S3, "storage.list", "s3_list_storage"),
        RemoteToolMapping::new(
            IntegrationId::GoogleEarthEngine,
            "gee.listAlgorithms",
            "gee_list_algorithms",
        ),
    ]
}

/// Routes capabilities to tools on the remote bus.
pub struct RemoteAdapter {
    bus: Arc<dyn RemoteToolBus>,
    mappings: Vec<RemoteToolMapping>,
    policy: Option<Arc<PolicyService>>,
}

impl RemoteAdapter {
    /// Create an adapter with the default routing table.
    #[must_use]
    pub fn new(bus: Arc<dyn RemoteToolBus>) -> Self {
        Self {
            bus,
            mappings: default_mappings(),
            policy: None,
        }
    }

    /// Replace the routing table.
    #[must_use]
    pub fn with_mappings(mut self, mappings: Vec<RemoteToolMapping>) -> Self {
        self.mappings = mappings;
        self
    }

    /// Attach the policy service so blocked tool names are enforced.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<PolicyService>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// The routing table, for capability listings.
    #[must_use]
    pub fn mappings(&self) -> &[RemoteToolMapping] {
        &self.mappings
    }

    fn mapping_for(&self, key: &CapabilityKey) -> Option<&RemoteToolMapping> {
        self.mappings
            .iter()
            .find(|m| m.integration_id == key.integration_id && m.capability == key.capability)
    }

    async fn is_blocked(&self, tool_name: &str) -> bool {
        match &self.policy {
            Some(policy) => {
                let config = policy.get_policy_config().await;
                config
                    .blocked_remote_tool_names
                    .iter()
                    .any(|blocked| blocked == tool_name)
            },
            None => false,
        }
    }
}

#[async_trait]
impl ConnectorAdapter for RemoteAdapter {
    fn id(&self) -> &str {
        "mcp"
    }

    fn backend(&self) -> Backend {
        Backend::Mcp
    }

    fn supports(&self, key: &CapabilityKey) -> bool {
        self.mapping_for(key).is_some()
    }

    async fn execute(&self, req: &ExecutionRequest, _ctx: &AdapterContext) -> AdapterResult {
        let key = req.key();
        let Some(mapping) = self.mapping_for(&key) else {
            return AdapterResult::fail(
                ErrorCode::UnsupportedCapability,
                format!("{key} has no remote tool mapping"),
            );
        };

        // A blocked tool behaves exactly as if it were never discovered.
        if self.is_blocked(&mapping.tool_name).await {
            tracing::debug!(tool = %mapping.tool_name, "remote tool is blocked by policy");
            return AdapterResult::fail(
                ErrorCode::RemoteToolUnavailable,
                format!("Remote tool {} is not available", mapping.tool_name),
            );
        }

        let tools = match self.bus.get_discovered_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                return AdapterResult::fail_retryable(
                    ErrorCode::ExecutionFailed,
                    format!("remote tool discovery failed: {e}"),
                );
            },
        };

        let candidates: Vec<&DiscoveredTool> = tools
            .iter()
            .filter(|t| t.name == mapping.tool_name)
            .collect();

        let server_id = match (&mapping.server_id, candidates.as_slice()) {
            // Pinned server: it must expose the tool.
            (Some(pinned), candidates) => {
                if candidates.iter().any(|t| &t.server_id == pinned) {
                    pinned.clone()
                } else {
                    return AdapterResult::fail(
                        ErrorCode::RemoteServerUnavailable,
                        format!(
                            "Remote server {pinned} does not expose tool {}",
                            mapping.tool_name
                        ),
                    );
                }
            },
            (None, []) => {
                return AdapterResult::fail(
                    ErrorCode::RemoteToolUnavailable,
                    format!("No remote server exposes tool {}", mapping.tool_name),
                );
            },
            (None, [only]) => only.server_id.clone(),
            (None, many) => {
                let mut server_ids: Vec<&str> =
                    many.iter().map(|t| t.server_id.as_str()).collect();
                server_ids.sort_unstable();
                server_ids.dedup();
                return AdapterResult::fail_with_details(
                    ErrorCode::RemoteToolUnavailable,
                    format!(
                        "Multiple remote servers expose tool {}: {}",
                        mapping.tool_name,
                        server_ids.join(", ")
                    ),
                    json!({"candidateServerIds": server_ids}),
                    false,
                );
            },
        };

        tracing::debug!(
            tool = %mapping.tool_name,
            server = %server_id,
            "invoking remote tool"
        );

        match self
            .bus
            .call_tool(&server_id, &mapping.tool_name, &req.input)
            .await
        {
            Ok(data) => AdapterResult::success(data),
            Err(e) => AdapterResult::fail_retryable(
                ErrorCode::ExecutionFailed,
                format!("remote tool {} failed: {e}", mapping.tool_name),
            ),
        }
    }
}

impl std::fmt::Debug for RemoteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAdapter")
            .field("mappings", &self.mappings.len())
            .finish_non_exhaustive()
    }
}
