//! Integration config validation.
//!
//! Validation never mutates: it surfaces a flat list of [`Diagnostic`]s so
//! callers can present every problem at once. An empty list means the
//! config is valid.

use serde::{Deserialize, Serialize};
use url::Url;

use meridian_core::{MAX_TIMEOUT_MS, MIN_TIMEOUT_MS};

use crate::types::{GeeConfig, IntegrationConfig, OgcConfig, PostgresConfig, S3Config, UrlConfig};

/// Smallest accepted bucket name.
const MIN_BUCKET_LEN: usize = 3;

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Dotted field path (`"port"`, `"endpoint"`).
    pub path: String,
    /// What is wrong with the field.
    pub message: String,
}

impl Diagnostic {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Validate an integration config against its schema.
#[must_use]
pub fn validate(config: &IntegrationConfig) -> Vec<Diagnostic> {
    match config {
        IntegrationConfig::PostgresqlPostgis(pg) => validate_postgres(pg),
        IntegrationConfig::Stac(url) | IntegrationConfig::Cog(url) | IntegrationConfig::Pmtiles(url) => {
            validate_url_config(url)
        },
        IntegrationConfig::Wms(ogc) | IntegrationConfig::Wmts(ogc) => validate_ogc(ogc),
        IntegrationConfig::S3(s3) => validate_s3(s3),
        IntegrationConfig::GoogleEarthEngine(gee) => validate_gee(gee),
    }
}

fn validate_postgres(pg: &PostgresConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    push_required(&mut diagnostics, "host", &pg.host);
    if pg.port == 0 {
        diagnostics.push(Diagnostic::new("port", "port must be between 1 and 65535"));
    }
    push_required(&mut diagnostics, "database", &pg.database);
    push_required(&mut diagnostics, "user", &pg.user);
    push_required(&mut diagnostics, "password", &pg.password);
    diagnostics
}

fn validate_url_config(config: &UrlConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    push_http_url(&mut diagnostics, "url", &config.url);
    push_timeout(&mut diagnostics, "timeoutMs", config.timeout_ms);
    diagnostics
}

fn validate_ogc(config: &OgcConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    push_http_url(&mut diagnostics, "url", &config.url);
    if let Some(version) = &config.version {
        if version.trim().is_empty() {
            diagnostics.push(Diagnostic::new("version", "version must not be blank"));
        }
    }
    push_timeout(&mut diagnostics, "timeoutMs", config.timeout_ms);
    diagnostics
}

fn validate_s3(s3: &S3Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if s3.bucket.trim().len() < MIN_BUCKET_LEN {
        diagnostics.push(Diagnostic::new(
            "bucket",
            format!("bucket name must be at least {MIN_BUCKET_LEN} characters"),
        ));
    }
    push_required(&mut diagnostics, "region", &s3.region);
    if let Some(endpoint) = &s3.endpoint {
        push_http_url(&mut diagnostics, "endpoint", endpoint);
    }
    push_required(&mut diagnostics, "accessKeyId", &s3.access_key_id);
    push_required(&mut diagnostics, "secretAccessKey", &s3.secret_access_key);
    diagnostics
}

fn validate_gee(gee: &GeeConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    push_required(&mut diagnostics, "projectId", &gee.project_id);
    if gee.service_account_json.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            "serviceAccountJson",
            "service account JSON is required",
        ));
    } else if serde_json::from_str::<serde_json::Value>(&gee.service_account_json).is_err() {
        diagnostics.push(Diagnostic::new(
            "serviceAccountJson",
            "service account JSON is not valid JSON",
        ));
    }
    diagnostics
}

fn push_required(diagnostics: &mut Vec<Diagnostic>, path: &str, value: &str) {
    if value.trim().is_empty() {
        diagnostics.push(Diagnostic::new(path, format!("{path} is required")));
    }
}

fn push_http_url(diagnostics: &mut Vec<Diagnostic>, path: &str, value: &str) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {},
        Ok(url) => diagnostics.push(Diagnostic::new(
            path,
            format!("unsupported URL scheme '{}'; expected http or https", url.scheme()),
        )),
        Err(_) => diagnostics.push(Diagnostic::new(path, format!("{path} is not a valid URL"))),
    }
}

fn push_timeout(diagnostics: &mut Vec<Diagnostic>, path: &str, timeout_ms: Option<u64>) {
    if let Some(timeout_ms) = timeout_ms {
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
            diagnostics.push(Diagnostic::new(
                path,
                format!("timeout must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS} ms"),
            ));
        }
    }
}
