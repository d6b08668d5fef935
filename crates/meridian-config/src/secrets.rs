//! Public/secret split of integration configs.
//!
//! Secrets are persisted behind the OS keyring while the public part lands
//! in ordinary settings rows. A fixed set of field names is secret per
//! integration; [`split`] and [`merge`] are exact inverses for any valid
//! config.

use serde_json::{Map, Value};

use meridian_core::IntegrationId;

use crate::error::{ConfigError, ConfigResult};
use crate::types::IntegrationConfig;

/// Wire names of the secret fields for an integration.
#[must_use]
pub fn secret_fields(integration_id: IntegrationId) -> &'static [&'static str] {
    match integration_id {
        IntegrationId::PostgresqlPostgis => &["password"],
        IntegrationId::S3 => &["accessKeyId", "secretAccessKey", "sessionToken"],
        IntegrationId::GoogleEarthEngine => &["serviceAccountJson"],
        IntegrationId::Stac
        | IntegrationId::Cog
        | IntegrationId::Pmtiles
        | IntegrationId::Wms
        | IntegrationId::Wmts => &[],
        _ => &[],
    }
}

/// A config split for separate persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitConfig {
    /// Non-secret fields, tag included.
    pub public: Map<String, Value>,
    /// Secret fields only.
    pub secret: Map<String, Value>,
}

/// Split a config into its public and secret parts.
///
/// # Errors
///
/// Returns an error if the config fails to serialise (never happens for the
/// shapes in this crate; kept for contract completeness).
pub fn split(config: &IntegrationConfig) -> ConfigResult<SplitConfig> {
    let value = serde_json::to_value(config)
        .map_err(|e| ConfigError::Serialization(e.to_string()))?;
    let Value::Object(mut public) = value else {
        return Err(ConfigError::Serialization(
            "integration config did not serialise to an object".to_string(),
        ));
    };

    let mut secret = Map::new();
    for field in secret_fields(config.integration_id()) {
        if let Some(value) = public.remove(*field) {
            secret.insert((*field).to_string(), value);
        }
    }

    Ok(SplitConfig { public, secret })
}

/// Recombine a public part with its secrets into a typed config.
///
/// # Errors
///
/// Returns an error if the merged object does not match the integration's
/// schema.
pub fn merge(public: &Map<String, Value>, secret: &Map<String, Value>) -> ConfigResult<IntegrationConfig> {
    let mut merged = public.clone();
    for (key, value) in secret {
        merged.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(merged))
        .map_err(|e| ConfigError::InvalidConfig(e.to_string()))
}
