//! Default route wiring.
//!
//! A static table drives registration: every capability gets a native route
//! (priority 10) and a remote route (priority 80), making `native` the
//! default primary with `mcp` as fallback. Registrations are append-only.

use std::sync::Arc;

use meridian_core::{Capability, ConnectorAdapter, IntegrationId};
use meridian_mcp::RemoteAdapter;
use meridian_native::NativeAdapter;
use meridian_registry::{CapabilityRegistry, RouteRegistration, Sensitivity};

/// Priority of native routes.
pub const NATIVE_PRIORITY: u32 = 10;
/// Priority of remote routes.
pub const MCP_PRIORITY: u32 = 80;

/// One row of the wiring table.
struct CapabilityWiring {
    integration_id: IntegrationId,
    capability: &'static str,
    native_description: &'static str,
    mcp_description: &'static str,
    sensitivity: Sensitivity,
}

const WIRING: [CapabilityWiring; 8] = [
    CapabilityWiring {
        integration_id: IntegrationId::PostgresqlPostgis,
        capability: "sql.query",
        native_description: "Run a read-only SQL query against PostgreSQL/PostGIS",
        mcp_description: "Run a read-only SQL query through the remote tool bus",
        sensitivity: Sensitivity::Sensitive,
    },
    CapabilityWiring {
        integration_id: IntegrationId::Stac,
        capability: "catalog.search",
        native_description: "Search a STAC catalog for items",
        mcp_description: "Search a STAC catalog through the remote tool bus",
        sensitivity: Sensitivity::Normal,
    },
    CapabilityWiring {
        integration_id: IntegrationId::Cog,
        capability: "raster.inspectMetadata",
        native_description: "Inspect the header of a remote Cloud-Optimized GeoTIFF",
        mcp_description: "Inspect a remote raster through the remote tool bus",
        sensitivity: Sensitivity::Normal,
    },
    CapabilityWiring {
        integration_id: IntegrationId::Pmtiles,
        capability: "tiles.inspectArchive",
        native_description: "Inspect the header of a remote PMTiles archive",
        mcp_description: "Inspect a tile archive through the remote tool bus",
        sensitivity: Sensitivity::Normal,
    },
    CapabilityWiring {
        integration_id: IntegrationId::Wms,
        capability: "tiles.getCapabilities",
        native_description: "Fetch and summarise WMS GetCapabilities",
        mcp_description: "Fetch WMS capabilities through the remote tool bus",
        sensitivity: Sensitivity::Normal,
    },
    CapabilityWiring {
        integration_id: IntegrationId::Wmts,
        capability: "tiles.getCapabilities",
        native_description: "Fetch and summarise WMTS GetCapabilities",
        mcp_description: "Fetch WMTS capabilities through the remote tool bus",
        sensitivity: Sensitivity::Normal,
    },
    CapabilityWiring {
        integration_id: IntegrationId::S3,
        capability: "storage.list",
        native_description: "List objects in an S3 bucket",
        mcp_description: "List bucket objects through the remote tool bus",
        sensitivity: Sensitivity::Normal,
    },
    CapabilityWiring {
        integration_id: IntegrationId::GoogleEarthEngine,
        capability: "gee.listAlgorithms",
        native_description: "List Earth Engine algorithms for a project",
        mcp_description: "List Earth Engine algorithms through the remote tool bus",
        sensitivity: Sensitivity::Normal,
    },
];

/// Register the default native and remote routes for every capability.
pub fn register_default_routes(
    registry: &CapabilityRegistry,
    native: &Arc<NativeAdapter>,
    remote: &Arc<RemoteAdapter>,
) {
    for wiring in &WIRING {
        registry.register(RouteRegistration {
            integration_id: wiring.integration_id,
            capability: Capability::new(wiring.capability),
            adapter: Arc::clone(native) as Arc<dyn ConnectorAdapter>,
            description: Some(wiring.native_description.to_string()),
            sensitivity: Some(wiring.sensitivity),
            priority: Some(NATIVE_PRIORITY),
        });
        registry.register(RouteRegistration {
            integration_id: wiring.integration_id,
            capability: Capability::new(wiring.capability),
            adapter: Arc::clone(remote) as Arc<dyn ConnectorAdapter>,
            description: Some(wiring.mcp_description.to_string()),
            sensitivity: Some(wiring.sensitivity),
            priority: Some(MCP_PRIORITY),
        });
    }
}
