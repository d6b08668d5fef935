//! Read-only SQL execution over an externally owned pool.
//!
//! The adapter never opens connections itself: it consumes the host
//! application's pool through the narrow [`SqlPool`] collaborator. Before
//! anything touches the pool the statement must pass the read-only policy.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use meridian_core::{AdapterResult, ErrorCode, IntegrationId};

use crate::input::{clamped_u64, opt_bool, opt_str};

/// Smallest accepted row limit.
const MIN_ROW_LIMIT: u64 = 1;
/// Largest accepted row limit.
const MAX_ROW_LIMIT: u64 = 1000;
/// Row limit applied when the caller sets none.
const DEFAULT_ROW_LIMIT: u64 = 200;

/// Connection state reported by the pool collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Whether the pool currently holds a live connection.
    pub connected: bool,
    /// The pool's connection settings, when connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

/// One column of a query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryField {
    /// Column name.
    pub name: String,
    /// Database type name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

/// Outcome of a query run through the pool collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    /// Whether the query ran.
    pub success: bool,
    /// Result rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Map<String, Value>>>,
    /// Row count before any truncation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    /// Result columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<QueryField>>,
    /// Server-side execution time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Status or error message.
    pub message: String,
}

/// The SQL pool owned by the host application.
#[async_trait]
pub trait SqlPool: Send + Sync {
    /// Current connection state for an integration.
    async fn get_connection_info(&self, integration_id: IntegrationId) -> ConnectionInfo;

    /// Run a statement with optional positional parameters.
    async fn execute_query(
        &self,
        integration_id: IntegrationId,
        sql: &str,
        params: Option<&[Value]>,
    ) -> QueryOutcome;
}

static MUTATING_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|alter|create|drop|truncate|grant|revoke|merge|call|copy|vacuum|reindex|cluster|refresh)\b",
    )
    .expect("mutating keyword regex is valid")
});

static SELECT_INTO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bselect\b.*\binto\b").expect("select-into regex is valid"));

/// Check a statement against the read-only policy.
///
/// Returns the offending rule's message, or `None` when the statement is
/// acceptable.
fn read_only_violation(query: &str) -> Option<String> {
    let trimmed = query.trim();
    let lowered = trimmed.to_lowercase();

    let starts_ok = ["select", "with", "explain"]
        .iter()
        .any(|prefix| lowered.starts_with(prefix));
    if !starts_ok {
        return Some(
            "Only read-only statements are allowed; the query must start with SELECT, WITH, or EXPLAIN"
                .to_string(),
        );
    }

    let statements = trimmed
        .split(';')
        .filter(|s| !s.trim().is_empty())
        .count();
    if statements != 1 {
        return Some("Exactly one SQL statement is allowed per query".to_string());
    }

    if let Some(m) = MUTATING_KEYWORDS.find(trimmed) {
        return Some(format!(
            "Mutating SQL keywords are not allowed (found '{}')",
            m.as_str()
        ));
    }

    if SELECT_INTO.is_match(trimmed) {
        return Some("SELECT ... INTO is not allowed".to_string());
    }

    None
}

/// Execute `sql.query`.
pub(crate) async fn execute(
    pool: &dyn SqlPool,
    integration_id: IntegrationId,
    input: &Map<String, Value>,
) -> AdapterResult {
    let Some(query) = opt_str(input, "query").map(str::trim).filter(|q| !q.is_empty()) else {
        return AdapterResult::fail(
            ErrorCode::ValidationFailed,
            "input.query must be a non-empty string",
        );
    };

    if opt_bool(input, "readOnly") == Some(false) {
        return AdapterResult::fail(
            ErrorCode::ValidationFailed,
            "Only read-only queries are supported; readOnly must not be false",
        );
    }

    if let Some(violation) = read_only_violation(query) {
        return AdapterResult::fail(ErrorCode::ValidationFailed, violation);
    }

    let params: Option<Vec<Value>> = match input.get("params") {
        None | Some(Value::Null) => None,
        Some(Value::Array(values)) => Some(values.clone()),
        Some(_) => {
            return AdapterResult::fail(
                ErrorCode::ValidationFailed,
                "input.params must be an array when present",
            );
        },
    };

    let row_limit = clamped_u64(input, "rowLimit", MIN_ROW_LIMIT, MAX_ROW_LIMIT, DEFAULT_ROW_LIMIT);

    let info = pool.get_connection_info(integration_id).await;
    if !info.connected {
        return AdapterResult::fail(
            ErrorCode::NotConfigured,
            format!("SQL pool for {integration_id} is not connected"),
        );
    }

    let outcome = pool
        .execute_query(integration_id, query, params.as_deref())
        .await;
    if !outcome.success {
        return AdapterResult::fail(ErrorCode::ExecutionFailed, outcome.message);
    }

    let rows = outcome.rows.unwrap_or_default();
    let total = outcome.row_count.unwrap_or(rows.len() as u64);
    let truncated = (rows.len() as u64) > row_limit || total > row_limit;
    let limited: Vec<&Map<String, Value>> = rows.iter().take(row_limit as usize).collect();

    tracing::debug!(
        integration = %integration_id,
        rows = limited.len(),
        truncated,
        "sql query returned"
    );

    let mut data = json!({
        "rows": limited,
        "rowCount": total,
        "truncated": truncated,
    });
    if let Some(obj) = data.as_object_mut() {
        if let Some(fields) = outcome.fields {
            obj.insert("fields".to_string(), json!(fields));
        }
        if let Some(execution_time_ms) = outcome.execution_time_ms {
            obj.insert("executionTimeMs".to_string(), json!(execution_time_ms));
        }
    }

    AdapterResult::success(data)
}
