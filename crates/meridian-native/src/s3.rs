//! S3 object listing (`ListObjectsV2`) with SigV4 signing.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use reqwest::Client;
use serde_json::{Map, Value, json};
use url::Url;

use meridian_config::S3Config;
use meridian_core::{AdapterResult, ErrorCode};

use crate::input::{clamped_u64, opt_str};
use crate::sigv4::{SigningParams, sign_get};
use crate::xml::first_tag_text;

/// Smallest accepted key count.
const MIN_KEYS: u64 = 1;
/// Largest accepted key count.
const MAX_KEYS: u64 = 1000;
/// Key count applied when the caller sets none.
const DEFAULT_KEYS: u64 = 50;

static CONTENTS_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<Contents>(.*?)</Contents>").expect("contents regex is valid")
});

/// Resolve the endpoint authority (`host[:port]`) and scheme.
fn endpoint_parts(config: &S3Config) -> Result<(String, String), String> {
    let endpoint = match &config.endpoint {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => format!("https://s3.{}.amazonaws.com", config.region),
    };
    let url = Url::parse(&endpoint).map_err(|e| format!("invalid S3 endpoint: {e}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| "S3 endpoint has no host".to_string())?;
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Ok((url.scheme().to_string(), authority))
}

/// One listed object.
#[derive(Debug, PartialEq)]
struct ListedObject {
    key: String,
    size: Option<u64>,
    last_modified: Option<String>,
}

/// Mine `<Contents>` blocks out of a ListObjectsV2 response.
fn parse_listing(body: &str) -> (Vec<ListedObject>, bool) {
    let mut objects = Vec::new();
    for block in CONTENTS_BLOCK.captures_iter(body) {
        let Some(content) = block.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let Some(key) = first_tag_text(content, "Key") else {
            continue;
        };
        objects.push(ListedObject {
            key,
            size: first_tag_text(content, "Size").and_then(|s| s.parse().ok()),
            last_modified: first_tag_text(content, "LastModified"),
        });
    }
    let truncated = first_tag_text(body, "IsTruncated")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    (objects, truncated)
}

/// Execute `storage.list`.
pub(crate) async fn execute(
    client: &Client,
    config: &S3Config,
    input: &Map<String, Value>,
    timeout: Duration,
) -> AdapterResult {
    let (scheme, authority) = match endpoint_parts(config) {
        Ok(parts) => parts,
        Err(message) => return AdapterResult::fail(ErrorCode::NotConfigured, message),
    };

    let (host, path) = if config.force_path_style {
        (authority, format!("/{}", config.bucket))
    } else {
        (format!("{}.{authority}", config.bucket), "/".to_string())
    };

    let max_keys = clamped_u64(input, "maxKeys", MIN_KEYS, MAX_KEYS, DEFAULT_KEYS);
    let prefix = opt_str(input, "prefix").filter(|p| !p.is_empty());

    let mut query = vec![("list-type".to_string(), "2".to_string())];
    if let Some(prefix) = prefix {
        query.push(("prefix".to_string(), prefix.to_string()));
    }
    query.push(("max-keys".to_string(), max_keys.to_string()));

    let params = SigningParams {
        access_key_id: &config.access_key_id,
        secret_access_key: &config.secret_access_key,
        session_token: config.session_token.as_deref(),
        region: &config.region,
        service: "s3",
        timestamp: Utc::now(),
    };

    let signed = match sign_get(&scheme, &host, &path, &query, &params) {
        Ok(signed) => signed,
        Err(message) => return AdapterResult::fail(ErrorCode::ExecutionFailed, message),
    };

    tracing::debug!(url = %signed.url, "listing S3 objects");

    let mut request = client.get(&signed.url).timeout(timeout);
    for (name, value) in &signed.headers {
        // reqwest derives Host from the URL; the remaining signed headers
        // must be sent exactly as signed.
        if *name != "host" {
            request = request.header(*name, value);
        }
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            return AdapterResult::fail_retryable(
                ErrorCode::ExecutionFailed,
                format!("S3 request failed: {e}"),
            );
        },
    };

    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return AdapterResult::fail_retryable(
                ErrorCode::ExecutionFailed,
                format!("failed to read S3 response body: {e}"),
            );
        },
    };

    if !status.is_success() {
        let code = first_tag_text(&body, "Code");
        let message = first_tag_text(&body, "Message");
        let mut text = format!("S3 listing failed with status {}", status.as_u16());
        if let Some(code) = &code {
            text.push_str(&format!(": {code}"));
        }
        if let Some(message) = &message {
            text.push_str(&format!(" - {message}"));
        }
        return AdapterResult::fail_with_details(
            ErrorCode::ExecutionFailed,
            text,
            json!({"status": status.as_u16(), "code": code, "message": message}),
            status.is_server_error(),
        );
    }

    let (objects, truncated) = parse_listing(&body);
    let listed: Vec<Value> = objects
        .iter()
        .map(|o| {
            json!({
                "key": o.key,
                "size": o.size,
                "lastModified": o.last_modified,
            })
        })
        .collect();

    let mut data = Map::new();
    data.insert("bucket".to_string(), json!(config.bucket));
    if let Some(prefix) = prefix {
        data.insert("prefix".to_string(), json!(prefix));
    }
    data.insert("count".to_string(), json!(listed.len()));
    data.insert("objects".to_string(), json!(listed));
    data.insert("truncated".to_string(), json!(truncated));

    AdapterResult::success(Value::Object(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> S3Config {
        S3Config {
            bucket: "imagery".to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some(server.uri()),
            access_key_id: "AKIA123".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
            force_path_style: true,
        }
    }

    const LISTING: &str = r"<?xml version='1.0'?>
        <ListBucketResult>
          <IsTruncated>true</IsTruncated>
          <Contents>
            <Key>tiles/0/0/0.png</Key>
            <Size>1024</Size>
            <LastModified>2024-03-01T10:00:00.000Z</LastModified>
          </Contents>
          <Contents>
            <Key>tiles/0/0/1.png</Key>
            <Size>2048</Size>
            <LastModified>2024-03-01T10:05:00.000Z</LastModified>
          </Contents>
        </ListBucketResult>";

    #[test]
    fn test_parse_listing() {
        let (objects, truncated) = parse_listing(LISTING);
        assert!(truncated);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].key, "tiles/0/0/0.png");
        assert_eq!(objects[0].size, Some(1024));
        assert_eq!(
            objects[0].last_modified.as_deref(),
            Some("2024-03-01T10:00:00.000Z")
        );
    }

    #[test]
    fn test_default_endpoint_from_region() {
        let config = S3Config {
            endpoint: None,
            ..config_for_dummy()
        };
        let (scheme, authority) = endpoint_parts(&config).unwrap();
        assert_eq!(scheme, "https");
        assert_eq!(authority, "s3.eu-north-1.amazonaws.com");
    }

    fn config_for_dummy() -> S3Config {
        S3Config {
            bucket: "imagery".to_string(),
            region: "eu-north-1".to_string(),
            endpoint: None,
            access_key_id: "AK".to_string(),
            secret_access_key: "SK".to_string(),
            session_token: None,
            force_path_style: true,
        }
    }

    #[tokio::test]
    async fn test_list_path_style() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/imagery"))
            .and(query_param("list-type", "2"))
            .and(query_param("max-keys", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;

        let result = execute(
            &Client::new(),
            &config_for(&server),
            &Map::new(),
            Duration::from_secs(5),
        )
        .await;

        let AdapterResult::Success { data, .. } = result else {
            panic!("expected success");
        };
        assert_eq!(data["bucket"], "imagery");
        assert_eq!(data["count"], 2);
        assert_eq!(data["truncated"], true);
        assert_eq!(data["objects"][1]["size"], 2048);
    }

    #[tokio::test]
    async fn test_authorization_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;

        let result = execute(
            &Client::new(),
            &config_for(&server),
            &Map::new(),
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_success());

        let requests = server.received_requests().await.unwrap();
        let authorization = requests[0]
            .headers
            .get("authorization")
            .expect("authorization header missing")
            .to_str()
            .unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIA123/"));
        assert!(authorization.contains("/us-east-1/s3/aws4_request"));
        assert!(authorization.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
        assert!(requests[0].headers.get("x-amz-date").is_some());
        assert!(requests[0].headers.get("x-amz-content-sha256").is_some());
    }

    #[tokio::test]
    async fn test_error_body_enriches_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<Error><Code>AccessDenied</Code><Message>nope</Message></Error>",
            ))
            .mount(&server)
            .await;

        let result = execute(
            &Client::new(),
            &config_for(&server),
            &Map::new(),
            Duration::from_secs(5),
        )
        .await;

        let AdapterResult::Failure { error } = result else {
            panic!("expected failure");
        };
        assert!(error.message.contains("AccessDenied"));
        assert!(error.message.contains("nope"));
        assert!(!error.retryable);
    }

    #[tokio::test]
    async fn test_server_error_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<Error/>"))
            .mount(&server)
            .await;

        let result = execute(
            &Client::new(),
            &config_for(&server),
            &Map::new(),
            Duration::from_secs(5),
        )
        .await;

        let AdapterResult::Failure { error } = result else {
            panic!("expected failure");
        };
        assert!(error.retryable);
    }

    #[tokio::test]
    async fn test_prefix_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("prefix", "tiles/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;

        let mut input = Map::new();
        input.insert("prefix".to_string(), json!("tiles/"));
        let result = execute(
            &Client::new(),
            &config_for(&server),
            &input,
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_success());
    }
}
