//! Typed per-integration configuration.
//!
//! Dynamically-shaped integration configs are expressed as a tagged union:
//! one variant per [`IntegrationId`], each with its own schema. The tag is
//! the integration's wire name, so a persisted `publicConfig` row merged
//! with its secrets deserialises directly into [`IntegrationConfig`].

use serde::{Deserialize, Serialize};

use meridian_core::IntegrationId;

/// SQL database connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Whether to require TLS.
    #[serde(default)]
    pub ssl: bool,
}

/// Object-store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    /// Bucket name.
    pub bucket: String,
    /// AWS region.
    pub region: String,
    /// Custom endpoint for S3-compatible stores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// Path-style addressing; virtual-host style when `false`.
    #[serde(default = "default_true")]
    pub force_path_style: bool,
}

fn default_true() -> bool {
    true
}

/// Settings for URL-backed services (catalogs, remote rasters, archives).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlConfig {
    /// Service or resource URL.
    pub url: String,
    /// Per-request time budget override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// OGC service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OgcConfig {
    /// Service endpoint URL.
    pub url: String,
    /// Protocol version; defaults depend on the service kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Per-request time budget override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Cloud catalog settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeeConfig {
    /// Service-account key file contents (JSON).
    pub service_account_json: String,
    /// Cloud project id.
    pub project_id: String,
}

/// One integration's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "integrationId")]
pub enum IntegrationConfig {
    /// PostgreSQL/PostGIS connection.
    #[serde(rename = "postgresql-postgis")]
    PostgresqlPostgis(PostgresConfig),
    /// STAC catalog endpoint.
    #[serde(rename = "stac")]
    Stac(UrlConfig),
    /// Remote Cloud-Optimized GeoTIFF.
    #[serde(rename = "cog")]
    Cog(UrlConfig),
    /// Remote PMTiles archive.
    #[serde(rename = "pmtiles")]
    Pmtiles(UrlConfig),
    /// WMS endpoint.
    #[serde(rename = "wms")]
    Wms(OgcConfig),
    /// WMTS endpoint.
    #[serde(rename = "wmts")]
    Wmts(OgcConfig),
    /// Object store.
    #[serde(rename = "s3")]
    S3(S3Config),
    /// Google Earth Engine project.
    #[serde(rename = "google-earth-engine")]
    GoogleEarthEngine(GeeConfig),
}

impl IntegrationConfig {
    /// The integration this config belongs to.
    #[must_use]
    pub fn integration_id(&self) -> IntegrationId {
        match self {
            Self::PostgresqlPostgis(_) => IntegrationId::PostgresqlPostgis,
            Self::Stac(_) => IntegrationId::Stac,
            Self::Cog(_) => IntegrationId::Cog,
            Self::Pmtiles(_) => IntegrationId::Pmtiles,
            Self::Wms(_) => IntegrationId::Wms,
            Self::Wmts(_) => IntegrationId::Wmts,
            Self::S3(_) => IntegrationId::S3,
            Self::GoogleEarthEngine(_) => IntegrationId::GoogleEarthEngine,
        }
    }
}
