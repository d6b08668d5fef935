//! Meridian Native - in-process backend adapters.
//!
//! One [`NativeAdapter`] serves every `(integration, capability)` pair that
//! has a native implementation: read-only SQL, STAC search, TIFF and
//! PMTiles header inspection, OGC capabilities, signed S3 listing, and the
//! Earth Engine catalog. Integration configs are loaded through the config
//! and secret store collaborators and recombined just before use.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod gee;
mod input;
mod ogc;
mod pmtiles;
mod probe;
mod s3;
mod sigv4;
pub mod sql;
mod stac;
mod tiff;
mod xml;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use meridian_config::{ConfigStore, IntegrationConfig, SecretStore, merge};
use meridian_core::{
    AdapterContext, AdapterResult, Backend, CapabilityKey, ConnectorAdapter, ErrorCode,
    ExecutionRequest, IntegrationId,
};

pub use sql::{ConnectionInfo, QueryField, QueryOutcome, SqlPool};

use crate::ogc::OgcService;

/// The `(integration, capability)` pairs this adapter implements.
const SUPPORTED: [(IntegrationId, &str); 8] = [
    (IntegrationId::PostgresqlPostgis, "sql.query"),
    (IntegrationId::Stac, "catalog.search"),
    (IntegrationId::Cog, "raster.inspectMetadata"),
    (IntegrationId::Pmtiles, "tiles.inspectArchive"),
    (IntegrationId::Wms, "tiles.getCapabilities"),
    (IntegrationId::Wmts, "tiles.getCapabilities"),
    (IntegrationId::S3, "storage.list"),
    (IntegrationId::GoogleEarthEngine, "gee.listAlgorithms"),
];

/// The native backend adapter.
///
/// Stateless per call; the HTTP client, collaborator handles, and the
/// discovery URL are the only long-lived members.
pub struct NativeAdapter {
    config_store: Arc<dyn ConfigStore>,
    secret_store: Arc<dyn SecretStore>,
    sql_pool: Arc<dyn SqlPool>,
    client: Client,
    discovery_url: String,
}

impl NativeAdapter {
    /// Create an adapter over the given collaborators.
    #[must_use]
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        secret_store: Arc<dyn SecretStore>,
        sql_pool: Arc<dyn SqlPool>,
    ) -> Self {
        Self {
            config_store,
            secret_store,
            sql_pool,
            client: Client::new(),
            discovery_url: gee::DISCOVERY_URL.to_string(),
        }
    }

    /// Override the Earth Engine discovery URL (tests).
    #[must_use]
    pub fn with_discovery_url(mut self, discovery_url: impl Into<String>) -> Self {
        self.discovery_url = discovery_url.into();
        self
    }

    /// Load, merge, and type an integration's stored configuration.
    async fn load_config(
        &self,
        integration_id: IntegrationId,
    ) -> Result<IntegrationConfig, AdapterResult> {
        let public = self
            .config_store
            .get_config(integration_id)
            .await
            .map_err(|e| {
                AdapterResult::fail(
                    ErrorCode::NotConfigured,
                    format!("failed to load configuration for {integration_id}: {e}"),
                )
            })?;
        let Some(mut public) = public else {
            return Err(AdapterResult::fail(
                ErrorCode::NotConfigured,
                format!("Integration {integration_id} is not configured"),
            ));
        };

        let secret = self
            .secret_store
            .get_secret_config(integration_id)
            .await
            .map_err(|e| {
                AdapterResult::fail(
                    ErrorCode::NotConfigured,
                    format!("failed to load secrets for {integration_id}: {e}"),
                )
            })?;

        // Stored rows are keyed by integration; the tag may be absent.
        public
            .entry("integrationId".to_string())
            .or_insert_with(|| serde_json::Value::String(integration_id.as_str().to_string()));

        merge(&public, &secret).map_err(|e| {
            AdapterResult::fail(
                ErrorCode::NotConfigured,
                format!("stored configuration for {integration_id} is invalid: {e}"),
            )
        })
    }
}

#[async_trait]
impl ConnectorAdapter for NativeAdapter {
    fn id(&self) -> &str {
        "native"
    }

    fn backend(&self) -> Backend {
        Backend::Native
    }

    fn supports(&self, key: &CapabilityKey) -> bool {
        SUPPORTED
            .iter()
            .any(|(id, cap)| *id == key.integration_id && *cap == key.capability.as_str())
    }

    async fn execute(&self, req: &ExecutionRequest, ctx: &AdapterContext) -> AdapterResult {
        let timeout = Duration::from_millis(ctx.timeout_ms);

        match (req.integration_id, req.capability.as_str()) {
            (IntegrationId::PostgresqlPostgis, "sql.query") => {
                sql::execute(self.sql_pool.as_ref(), req.integration_id, &req.input).await
            },
            (IntegrationId::Stac, "catalog.search") => {
                let config = match self.load_config(req.integration_id).await {
                    Ok(IntegrationConfig::Stac(config)) => config,
                    Ok(_) => return wrong_shape(req.integration_id),
                    Err(failure) => return failure,
                };
                let timeout = effective_timeout(config.timeout_ms, timeout);
                stac::execute(&self.client, &config, &req.input, timeout).await
            },
            (IntegrationId::Cog, "raster.inspectMetadata") => {
                let config = match self.load_config(req.integration_id).await {
                    Ok(IntegrationConfig::Cog(config)) => config,
                    Ok(_) => return wrong_shape(req.integration_id),
                    Err(failure) => return failure,
                };
                let timeout = effective_timeout(config.timeout_ms, timeout);
                tiff::execute(&self.client, &config, &req.input, timeout).await
            },
            (IntegrationId::Pmtiles, "tiles.inspectArchive") => {
                let config = match self.load_config(req.integration_id).await {
                    Ok(IntegrationConfig::Pmtiles(config)) => config,
                    Ok(_) => return wrong_shape(req.integration_id),
                    Err(failure) => return failure,
                };
                let timeout = effective_timeout(config.timeout_ms, timeout);
                pmtiles::execute(&self.client, &config, &req.input, timeout).await
            },
            (IntegrationId::Wms | IntegrationId::Wmts, "tiles.getCapabilities") => {
                let Some(service) = OgcService::for_integration(req.integration_id) else {
                    return wrong_shape(req.integration_id);
                };
                let config = match self.load_config(req.integration_id).await {
                    Ok(IntegrationConfig::Wms(config) | IntegrationConfig::Wmts(config)) => config,
                    Ok(_) => return wrong_shape(req.integration_id),
                    Err(failure) => return failure,
                };
                let timeout = effective_timeout(config.timeout_ms, timeout);
                ogc::execute(&self.client, &config, service, &req.input, timeout).await
            },
            (IntegrationId::S3, "storage.list") => {
                let config = match self.load_config(req.integration_id).await {
                    Ok(IntegrationConfig::S3(config)) => config,
                    Ok(_) => return wrong_shape(req.integration_id),
                    Err(failure) => return failure,
                };
                s3::execute(&self.client, &config, &req.input, timeout).await
            },
            (IntegrationId::GoogleEarthEngine, "gee.listAlgorithms") => {
                let config = match self.load_config(req.integration_id).await {
                    Ok(IntegrationConfig::GoogleEarthEngine(config)) => config,
                    Ok(_) => return wrong_shape(req.integration_id),
                    Err(failure) => return failure,
                };
                gee::execute(&self.client, &config, &req.input, timeout, &self.discovery_url).await
            },
            (integration_id, capability) => AdapterResult::fail(
                ErrorCode::UnsupportedCapability,
                format!("{integration_id}/{capability} has no native implementation"),
            ),
        }
    }
}

impl std::fmt::Debug for NativeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeAdapter").finish_non_exhaustive()
    }
}

/// The integration's stored timeout, bounded by the attempt budget.
fn effective_timeout(config_timeout_ms: Option<u64>, attempt_budget: Duration) -> Duration {
    match config_timeout_ms {
        Some(timeout_ms) => Duration::from_millis(timeout_ms).min(attempt_budget),
        None => attempt_budget,
    }
}

fn wrong_shape(integration_id: IntegrationId) -> AdapterResult {
    AdapterResult::fail(
        ErrorCode::NotConfigured,
        format!("stored configuration for {integration_id} has the wrong shape"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_config::ConfigResult;
    use serde_json::{Map, Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct MemoryStores {
        configs: Mutex<HashMap<IntegrationId, Map<String, Value>>>,
        secrets: Mutex<HashMap<IntegrationId, Map<String, Value>>>,
    }

    #[async_trait]
    impl ConfigStore for MemoryStores {
        async fn get_config(
            &self,
            integration_id: IntegrationId,
        ) -> ConfigResult<Option<Map<String, Value>>> {
            Ok(self.configs.lock().unwrap().get(&integration_id).cloned())
        }
    }

    #[async_trait]
    impl SecretStore for MemoryStores {
        async fn get_secret_config(
            &self,
            integration_id: IntegrationId,
        ) -> ConfigResult<Map<String, Value>> {
            Ok(self
                .secrets
                .lock()
                .unwrap()
                .get(&integration_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn set_secret_config(
            &self,
            integration_id: IntegrationId,
            secrets: Map<String, Value>,
        ) -> ConfigResult<()> {
            let mut map = self.secrets.lock().unwrap();
            if secrets.is_empty() {
                map.remove(&integration_id);
            } else {
                map.insert(integration_id, secrets);
            }
            Ok(())
        }
    }

    struct NoPool;

    #[async_trait]
    impl SqlPool for NoPool {
        async fn get_connection_info(&self, _integration_id: IntegrationId) -> ConnectionInfo {
            ConnectionInfo {
                connected: false,
                config: None,
            }
        }

        async fn execute_query(
            &self,
            _integration_id: IntegrationId,
            _sql: &str,
            _params: Option<&[Value]>,
        ) -> QueryOutcome {
            QueryOutcome {
                success: false,
                rows: None,
                row_count: None,
                fields: None,
                execution_time_ms: None,
                message: "no pool".to_string(),
            }
        }
    }

    fn adapter_with(stores: Arc<MemoryStores>) -> NativeAdapter {
        NativeAdapter::new(
            Arc::clone(&stores) as Arc<dyn ConfigStore>,
            stores as Arc<dyn SecretStore>,
            Arc::new(NoPool),
        )
    }

    fn ctx() -> AdapterContext {
        AdapterContext {
            timeout_ms: 5_000,
            attempt: 0,
            max_retries: 0,
        }
    }

    #[test]
    fn test_supports_exactly_the_native_set() {
        let adapter = adapter_with(Arc::new(MemoryStores::default()));
        for (integration_id, capability) in SUPPORTED {
            assert!(adapter.supports(&CapabilityKey::new(integration_id, capability)));
        }
        assert!(!adapter.supports(&CapabilityKey::new(IntegrationId::S3, "storage.delete")));
        assert!(!adapter.supports(&CapabilityKey::new(IntegrationId::Stac, "sql.query")));
    }

    #[tokio::test]
    async fn test_unconfigured_integration() {
        let adapter = adapter_with(Arc::new(MemoryStores::default()));
        let req = ExecutionRequest::new(IntegrationId::Stac, "catalog.search");
        let AdapterResult::Failure { error } = adapter.execute(&req, &ctx()).await else {
            panic!("expected failure");
        };
        assert_eq!(error.code, ErrorCode::NotConfigured);
        assert!(error.message.contains("not configured"));
    }

    #[tokio::test]
    async fn test_unsupported_capability() {
        let adapter = adapter_with(Arc::new(MemoryStores::default()));
        let req = ExecutionRequest::new(IntegrationId::Stac, "tiles.getCapabilities");
        let AdapterResult::Failure { error } = adapter.execute(&req, &ctx()).await else {
            panic!("expected failure");
        };
        assert_eq!(error.code, ErrorCode::UnsupportedCapability);
    }

    #[tokio::test]
    async fn test_config_merge_feeds_capability() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "features": [],
                "links": [],
            })))
            .mount(&server)
            .await;

        let stores = Arc::new(MemoryStores::default());
        stores.configs.lock().unwrap().insert(
            IntegrationId::Stac,
            json!({"url": server.uri()}).as_object().cloned().unwrap(),
        );
        let adapter = adapter_with(stores);

        let req = ExecutionRequest::new(IntegrationId::Stac, "catalog.search");
        let result = adapter.execute(&req, &ctx()).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_secret_merge_for_s3() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>"),
            )
            .mount(&server)
            .await;

        let stores = Arc::new(MemoryStores::default());
        stores.configs.lock().unwrap().insert(
            IntegrationId::S3,
            json!({"bucket": "imagery", "region": "us-east-1", "endpoint": server.uri()})
                .as_object()
                .cloned()
                .unwrap(),
        );
        stores.secrets.lock().unwrap().insert(
            IntegrationId::S3,
            json!({"accessKeyId": "AK", "secretAccessKey": "SK"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let adapter = adapter_with(stores);

        let req = ExecutionRequest::new(IntegrationId::S3, "storage.list");
        let result = adapter.execute(&req, &ctx()).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_missing_secret_is_not_configured() {
        let stores = Arc::new(MemoryStores::default());
        stores.configs.lock().unwrap().insert(
            IntegrationId::S3,
            json!({"bucket": "imagery", "region": "us-east-1"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let adapter = adapter_with(stores);

        let req = ExecutionRequest::new(IntegrationId::S3, "storage.list");
        let AdapterResult::Failure { error } = adapter.execute(&req, &ctx()).await else {
            panic!("expected failure");
        };
        assert_eq!(error.code, ErrorCode::NotConfigured);
        assert!(error.message.contains("invalid"));
    }

    #[test]
    fn test_effective_timeout_bounded_by_budget() {
        let budget = Duration::from_millis(5_000);
        assert_eq!(effective_timeout(None, budget), budget);
        assert_eq!(
            effective_timeout(Some(2_000), budget),
            Duration::from_millis(2_000)
        );
        assert_eq!(effective_timeout(Some(60_000), budget), budget);
    }
}
