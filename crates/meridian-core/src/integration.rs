//! Integration identifiers.
//!
//! An **integration** is an external service family (object store, tile
//! server, SQL database, catalog, cloud API). The set is closed: every
//! boundary that accepts an integration id parses it through
//! [`IntegrationId::from_str`], which rejects unknown values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of well-known integration identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub enum IntegrationId {
    /// PostgreSQL with the PostGIS extension.
    #[serde(rename = "postgresql-postgis")]
    PostgresqlPostgis,
    /// SpatioTemporal Asset Catalog API.
    #[serde(rename = "stac")]
    Stac,
    /// Cloud-Optimized GeoTIFF over HTTP range requests.
    #[serde(rename = "cog")]
    Cog,
    /// PMTiles single-file tile archive.
    #[serde(rename = "pmtiles")]
    Pmtiles,
    /// OGC Web Map Service.
    #[serde(rename = "wms")]
    Wms,
    /// OGC Web Map Tile Service.
    #[serde(rename = "wmts")]
    Wmts,
    /// Amazon S3 (or S3-compatible) object storage.
    #[serde(rename = "s3")]
    S3,
    /// Google Earth Engine cloud catalog.
    #[serde(rename = "google-earth-engine")]
    GoogleEarthEngine,
}

impl IntegrationId {
    /// All well-known integrations, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::PostgresqlPostgis,
        Self::Stac,
        Self::Cog,
        Self::Pmtiles,
        Self::Wms,
        Self::Wmts,
        Self::S3,
        Self::GoogleEarthEngine,
    ];

    /// The bit-stable wire name for this integration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PostgresqlPostgis => "postgresql-postgis",
            Self::Stac => "stac",
            Self::Cog => "cog",
            Self::Pmtiles => "pmtiles",
            Self::Wms => "wms",
            Self::Wmts => "wmts",
            Self::S3 => "s3",
            Self::GoogleEarthEngine => "google-earth-engine",
        }
    }
}

impl fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a well-known integration id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown integration id: {0}")]
pub struct UnknownIntegrationId(pub String);

impl FromStr for IntegrationId {
    type Err = UnknownIntegrationId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgresql-postgis" => Ok(Self::PostgresqlPostgis),
            "stac" => Ok(Self::Stac),
            "cog" => Ok(Self::Cog),
            "pmtiles" => Ok(Self::Pmtiles),
            "wms" => Ok(Self::Wms),
            "wmts" => Ok(Self::Wmts),
            "s3" => Ok(Self::S3),
            "google-earth-engine" => Ok(Self::GoogleEarthEngine),
            other => Err(UnknownIntegrationId(other.to_string())),
        }
    }
}
