//! WMS / WMTS GetCapabilities inspection.
//!
//! The capabilities document is fetched, sniffed for exception reports, and
//! mined for layer names with lightweight pattern extraction; the full XML
//! is never modelled.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde_json::{Map, Value, json};
use url::Url;

use meridian_config::OgcConfig;
use meridian_core::{AdapterResult, ErrorCode, IntegrationId};

use crate::input::opt_str;
use crate::xml::decode_entities;

/// Default WMS protocol version.
const DEFAULT_WMS_VERSION: &str = "1.3.0";
/// Default WMTS protocol version.
const DEFAULT_WMTS_VERSION: &str = "1.0.0";

/// How many layer names are returned as a sample.
const SAMPLE_LAYER_COUNT: usize = 25;
/// Longest XML snippet echoed back.
const SNIPPET_MAX_CHARS: usize = 4_000;

static EXCEPTION_REPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ServiceException|ExceptionReport|ows:ExceptionReport")
        .expect("exception report regex is valid")
});

static WMS_LAYER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<Layer\b[^>]*>.*?<Name>([^<]*)</Name>")
        .expect("WMS layer regex is valid")
});

static WMTS_LAYER_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:wmts:)?Layer\b[^>]*>(.*?)</(?:wmts:)?Layer>")
        .expect("WMTS layer block regex is valid")
});

static WMTS_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:ows:)?Identifier>([^<]*)</(?:ows:)?Identifier>")
        .expect("WMTS identifier regex is valid")
});

/// Which OGC service is being addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OgcService {
    Wms,
    Wmts,
}

impl OgcService {
    pub(crate) fn for_integration(integration_id: IntegrationId) -> Option<Self> {
        match integration_id {
            IntegrationId::Wms => Some(Self::Wms),
            IntegrationId::Wmts => Some(Self::Wmts),
            _ => None,
        }
    }

    const fn service_param(self) -> &'static str {
        match self {
            Self::Wms => "WMS",
            Self::Wmts => "WMTS",
        }
    }

    const fn default_version(self) -> &'static str {
        match self {
            Self::Wms => DEFAULT_WMS_VERSION,
            Self::Wmts => DEFAULT_WMTS_VERSION,
        }
    }
}

/// Build the GetCapabilities URL, replacing any existing service, request,
/// and version parameters.
fn capabilities_url(base: &str, service: OgcService, version: &str) -> Result<Url, String> {
    let mut url = Url::parse(base).map_err(|e| format!("invalid service URL: {e}"))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            key != "service" && key != "request" && key != "version"
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        pairs.append_pair("service", service.service_param());
        pairs.append_pair("request", "GetCapabilities");
        pairs.append_pair("version", version);
    }
    Ok(url)
}

/// Extract layer names, entity-decoded, deduplicated in first-seen order.
fn extract_layer_names(body: &str, service: OgcService) -> Vec<String> {
    let mut names = Vec::new();
    let mut push = |raw: &str| {
        let name = decode_entities(raw.trim());
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    };

    match service {
        OgcService::Wms => {
            for captures in WMS_LAYER_NAME.captures_iter(body) {
                if let Some(m) = captures.get(1) {
                    push(m.as_str());
                }
            }
        },
        OgcService::Wmts => {
            for block in WMTS_LAYER_BLOCK.captures_iter(body) {
                let Some(content) = block.get(1) else { continue };
                if let Some(identifier) = WMTS_IDENTIFIER
                    .captures(content.as_str())
                    .and_then(|c| c.get(1))
                {
                    push(identifier.as_str());
                }
            }
        },
    }

    names
}

/// Truncate a snippet at a char boundary.
fn snippet(body: &str) -> &str {
    if body.len() <= SNIPPET_MAX_CHARS {
        return body;
    }
    let mut end = SNIPPET_MAX_CHARS;
    while end > 0 && !body.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    &body[..end]
}

/// Execute `tiles.getCapabilities`.
pub(crate) async fn execute(
    client: &Client,
    config: &OgcConfig,
    service: OgcService,
    input: &Map<String, Value>,
    timeout: Duration,
) -> AdapterResult {
    let version = opt_str(input, "version")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .or_else(|| config.version.clone())
        .unwrap_or_else(|| service.default_version().to_string());

    let url = match capabilities_url(&config.url, service, &version) {
        Ok(url) => url,
        Err(message) => return AdapterResult::fail(ErrorCode::ValidationFailed, message),
    };

    tracing::debug!(url = %url, "fetching OGC capabilities");

    let response = match client.get(url.clone()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => {
            return AdapterResult::fail_retryable(
                ErrorCode::ExecutionFailed,
                format!("GetCapabilities request failed: {e}"),
            );
        },
    };

    let status = response.status();
    if !status.is_success() {
        return AdapterResult::fail_with_details(
            ErrorCode::ExecutionFailed,
            format!("GetCapabilities failed with status {}", status.as_u16()),
            json!({"status": status.as_u16()}),
            status.is_server_error(),
        );
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return AdapterResult::fail_retryable(
                ErrorCode::ExecutionFailed,
                format!("failed to read capabilities body: {e}"),
            );
        },
    };

    if EXCEPTION_REPORT.is_match(&body) {
        return AdapterResult::fail(
            ErrorCode::ExecutionFailed,
            format!(
                "{} service returned an exception report",
                service.service_param()
            ),
        );
    }

    let names = extract_layer_names(&body, service);
    let sample: Vec<&String> = names.iter().take(SAMPLE_LAYER_COUNT).collect();

    AdapterResult::success(json!({
        "service": service.service_param(),
        "version": version,
        "layerCount": names.len(),
        "sampleLayers": sample,
        "capabilitiesSnippet": snippet(&body),
    }))
}
