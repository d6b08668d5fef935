//! Collaborator store traits, config layering, and integration status rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use meridian_core::IntegrationId;

use crate::error::ConfigResult;

/// Narrow view of the host application's settings store.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the stored (partial) public config for an integration.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying store fails.
    async fn get_config(&self, integration_id: IntegrationId)
    -> ConfigResult<Option<Map<String, Value>>>;
}

/// Narrow view of the host application's secret store (OS keyring or
/// equivalent). Values are opaque and string-keyed.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Load the stored secret fields for an integration.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying store fails.
    async fn get_secret_config(
        &self,
        integration_id: IntegrationId,
    ) -> ConfigResult<Map<String, Value>>;

    /// Persist the secret fields for an integration; an empty map deletes
    /// the entry.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying store fails.
    async fn set_secret_config(
        &self,
        integration_id: IntegrationId,
        secrets: Map<String, Value>,
    ) -> ConfigResult<()>;
}

/// Layer a stored config over a credential fallback.
///
/// For every field in either map the stored value wins when meaningful
/// (non-null, non-blank); otherwise the fallback value is taken. Returns
/// `None` iff no meaningful fields remain.
#[must_use]
pub fn layer_config(
    stored: Option<&Map<String, Value>>,
    fallback: Option<&Map<String, Value>>,
) -> Option<Map<String, Value>> {
    let mut layered = Map::new();

    if let Some(fallback) = fallback {
        for (key, value) in fallback {
            if is_meaningful(value) {
                layered.insert(key.clone(), value.clone());
            }
        }
    }
    if let Some(stored) = stored {
        for (key, value) in stored {
            if is_meaningful(value) {
                layered.insert(key.clone(), value.clone());
            }
        }
    }

    if layered.is_empty() { None } else { Some(layered) }
}

fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Connection state of one integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrationStatus {
    /// No usable configuration is stored.
    NotConfigured,
    /// Configured but not currently connected.
    Disconnected,
    /// Last connection check succeeded.
    Connected,
    /// Last connection check failed.
    Error,
}

/// Persisted per-integration status row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatusRecord {
    /// Connection state.
    pub status: IntegrationStatus,
    /// When the integration last served a request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    /// Last status message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the status was last checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
    /// Whether a public config is stored.
    pub has_config: bool,
    /// The stored public config.
    pub public_config: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_stored_field_wins_when_meaningful() {
        let stored = map(&[("host", json!("db.new")), ("user", json!(""))]);
        let fallback = map(&[("host", json!("db.old")), ("user", json!("legacy"))]);

        let layered = layer_config(Some(&stored), Some(&fallback)).unwrap();
        assert_eq!(layered["host"], "db.new");
        // Blank stored value falls back to the legacy credential row.
        assert_eq!(layered["user"], "legacy");
    }

    #[test]
    fn test_layer_none_when_nothing_meaningful() {
        let stored = map(&[("host", json!("")), ("port", Value::Null)]);
        assert!(layer_config(Some(&stored), None).is_none());
        assert!(layer_config(None, None).is_none());
    }

    #[test]
    fn test_fallback_only() {
        let fallback = map(&[("user", json!("legacy"))]);
        let layered = layer_config(None, Some(&fallback)).unwrap();
        assert_eq!(layered["user"], "legacy");
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&IntegrationStatus::NotConfigured).unwrap(),
            "\"not-configured\""
        );
    }
}
