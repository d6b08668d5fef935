//! Remote header probing over HTTP.
//!
//! Binary inspection capabilities (TIFF, PMTiles) never download whole
//! files: they HEAD the URL for metadata, then fetch the leading bytes with
//! a range request. Servers that reject HEAD are tolerated with a warning;
//! a failed range request is fatal.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use meridian_core::{AdapterFailure, ErrorCode};

/// What the probe observed, attached to results as diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProbeReport {
    /// Status of the HEAD request; absent when the request itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_status: Option<u16>,
    /// Status of the ranged GET.
    pub range_status: u16,
    /// Total resource length, from HEAD or the Content-Range total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    /// Content type reported by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Accept-Ranges header, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_ranges: Option<String>,
    /// Content-Range header of the ranged response, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_range: Option<String>,
    /// How many header bytes were requested.
    pub requested_header_bytes: u64,
    /// How many header bytes arrived.
    pub received_header_bytes: u64,
    /// Non-fatal observations (HEAD rejected, short reads, ...).
    pub warnings: Vec<String>,
}

/// Probe result: the leading bytes plus the observation report.
#[derive(Debug)]
pub(crate) struct HeaderProbe {
    pub bytes: Vec<u8>,
    pub report: ProbeReport,
}

/// Fetch the first `header_bytes` bytes of `url`.
pub(crate) async fn probe_header(
    client: &Client,
    url: &str,
    header_bytes: u64,
    timeout: Duration,
) -> Result<HeaderProbe, AdapterFailure> {
    let mut warnings = Vec::new();
    let mut head_status = None;
    let mut content_length = None;
    let mut content_type = None;
    let mut accept_ranges = None;

    match client.head(url).timeout(timeout).send().await {
        Ok(response) => {
            let status = response.status();
            head_status = Some(status.as_u16());
            if status.is_success() {
                content_length = header_u64(&response, reqwest::header::CONTENT_LENGTH);
                content_type = header_string(&response, reqwest::header::CONTENT_TYPE);
                accept_ranges = header_string(&response, reqwest::header::ACCEPT_RANGES);
            } else {
                warnings.push(format!("HEAD request returned status {}", status.as_u16()));
            }
        },
        Err(e) => {
            warnings.push(format!("HEAD request failed: {e}"));
        },
    }

    let range_end = header_bytes.saturating_sub(1);
    let response = client
        .get(url)
        .header(reqwest::header::RANGE, format!("bytes=0-{range_end}"))
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| transport_failure("range request", &e))?;

    let range_status = response.status();
    if !range_status.is_success() {
        return Err(AdapterFailure {
            code: ErrorCode::ExecutionFailed,
            message: format!(
                "range request for {url} failed with status {}",
                range_status.as_u16()
            ),
            details: None,
            retryable: range_status.is_server_error(),
        });
    }

    let content_range = header_string(&response, reqwest::header::CONTENT_RANGE);
    if content_type.is_none() {
        content_type = header_string(&response, reqwest::header::CONTENT_TYPE);
    }
    if content_length.is_none() {
        content_length = content_range
            .as_deref()
            .and_then(parse_content_range_total);
    }

    let mut bytes = response
        .bytes()
        .await
        .map_err(|e| transport_failure("range response body", &e))?
        .to_vec();

    // Servers that ignore Range answer 200 with the full body; keep only
    // the requested prefix.
    if (bytes.len() as u64) > header_bytes {
        warnings.push(format!(
            "server ignored the range request and sent {} bytes",
            bytes.len()
        ));
        bytes.truncate(usize::try_from(header_bytes).unwrap_or(usize::MAX));
    }

    if (bytes.len() as u64) < header_bytes {
        warnings.push(format!(
            "requested {header_bytes} header bytes but received {}",
            bytes.len()
        ));
    }

    let report = ProbeReport {
        head_status,
        range_status: range_status.as_u16(),
        content_length,
        content_type,
        accept_ranges,
        content_range,
        requested_header_bytes: header_bytes,
        received_header_bytes: bytes.len() as u64,
        warnings,
    };

    Ok(HeaderProbe { bytes, report })
}

fn transport_failure(what: &str, error: &reqwest::Error) -> AdapterFailure {
    AdapterFailure {
        code: ErrorCode::ExecutionFailed,
        message: format!("{what} failed: {error}"),
        details: None,
        retryable: true,
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn header_u64(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Pull the total length out of `bytes 0-4095/123456`.
fn parse_content_range_total(content_range: &str) -> Option<u64> {
    content_range.rsplit('/').next()?.trim().parse().ok()
}
