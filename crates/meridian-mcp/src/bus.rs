//! The remote tool bus collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One tool currently discovered on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredTool {
    /// Tool name as exposed by its server.
    pub name: String,
    /// Server the tool lives on.
    pub server_id: String,
}

impl DiscoveredTool {
    /// Build a discovered tool.
    #[must_use]
    pub fn new(name: impl Into<String>, server_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_id: server_id.into(),
        }
    }
}

/// Errors raised by the bus collaborator.
#[derive(Debug, Clone, Error)]
pub enum RemoteBusError {
    /// Tool discovery failed.
    #[error("tool discovery failed: {0}")]
    Discovery(String),

    /// A tool invocation threw.
    #[error("tool call failed: {0}")]
    Call(String),
}

/// The externally-hosted tool registry.
///
/// Owned by the host application; the remote adapter only queries discovery
/// state and invokes tools.
#[async_trait]
pub trait RemoteToolBus: Send + Sync {
    /// Tools currently discovered across all servers.
    ///
    /// # Errors
    ///
    /// Returns an error when the bus is unreachable.
    async fn get_discovered_tools(&self) -> Result<Vec<DiscoveredTool>, RemoteBusError>;

    /// Invoke a tool on a specific server.
    ///
    /// # Errors
    ///
    /// Returns an error when the server rejects or the invocation throws.
    async fn call_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        input: &Map<String, Value>,
    ) -> Result<Value, RemoteBusError>;
}
