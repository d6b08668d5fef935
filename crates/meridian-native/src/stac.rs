//! STAC catalog search (`POST /search`).

use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value, json};

use meridian_config::UrlConfig;
use meridian_core::{AdapterResult, ErrorCode};

use crate::input::clamped_u64;

/// Smallest accepted search limit.
const MIN_LIMIT: u64 = 1;
/// Largest accepted search limit.
const MAX_LIMIT: u64 = 500;
/// Limit applied when the caller sets none.
const DEFAULT_LIMIT: u64 = 25;

/// Normalise a catalog base URL so it ends with `/search`.
fn search_url(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/search") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/search")
    }
}

/// Shape the search body, forwarding only well-formed filter fields.
fn search_body(input: &Map<String, Value>) -> Value {
    let mut body = Map::new();
    body.insert(
        "limit".to_string(),
        json!(clamped_u64(input, "limit", MIN_LIMIT, MAX_LIMIT, DEFAULT_LIMIT)),
    );

    if let Some(Value::Array(collections)) = input.get("collections") {
        if collections.iter().all(Value::is_string) {
            body.insert("collections".to_string(), json!(collections));
        }
    }
    if let Some(Value::Array(bbox)) = input.get("bbox") {
        if bbox.len() >= 4 && bbox.iter().all(Value::is_number) {
            body.insert("bbox".to_string(), json!(bbox));
        }
    }
    if let Some(Value::String(datetime)) = input.get("datetime") {
        if !datetime.trim().is_empty() {
            body.insert("datetime".to_string(), json!(datetime));
        }
    }
    if let Some(Value::Object(query)) = input.get("query") {
        body.insert("query".to_string(), json!(query));
    }
    if let Some(Value::Object(intersects)) = input.get("intersects") {
        body.insert("intersects".to_string(), json!(intersects));
    }

    Value::Object(body)
}

/// Execute `catalog.search`.
pub(crate) async fn execute(
    client: &Client,
    config: &UrlConfig,
    input: &Map<String, Value>,
    timeout: Duration,
) -> AdapterResult {
    let url = search_url(&config.url);
    let body = search_body(input);

    tracing::debug!(url = %url, "searching STAC catalog");

    let response = match client
        .post(&url)
        .header(reqwest::header::ACCEPT, "application/geo+json, application/json")
        .json(&body)
        .timeout(timeout)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            return AdapterResult::fail_retryable(
                ErrorCode::ExecutionFailed,
                format!("STAC search request failed: {e}"),
            );
        },
    };

    let status = response.status();
    if !status.is_success() {
        let failure = AdapterResult::fail_with_details(
            ErrorCode::ExecutionFailed,
            format!("STAC search failed with status {}", status.as_u16()),
            json!({"status": status.as_u16()}),
            status.is_server_error(),
        );
        return failure;
    }

    let payload: Value = match response.json().await {
        Ok(payload) => payload,
        Err(e) => {
            return AdapterResult::fail(
                ErrorCode::ExecutionFailed,
                format!("STAC search response was not valid JSON: {e}"),
            );
        },
    };
    let Value::Object(payload) = payload else {
        return AdapterResult::fail(
            ErrorCode::ExecutionFailed,
            "STAC search response was not a JSON object",
        );
    };

    let features = payload
        .get("features")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let matched = payload
        .get("numberMatched")
        .and_then(Value::as_u64)
        .or_else(|| {
            payload
                .get("context")
                .and_then(|c| c.get("matched"))
                .and_then(Value::as_u64)
        });
    let links = payload
        .get("links")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut data = Map::new();
    if let Some(matched) = matched {
        data.insert("matched".to_string(), json!(matched));
    }
    data.insert("returned".to_string(), json!(features.len()));
    data.insert("features".to_string(), json!(features));
    data.insert("links".to_string(), json!(links));

    AdapterResult::success(Value::Object(data))
}
