//! Run records — one per execution, plus synthesised lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use meridian_core::{Backend, Capability, ErrorCode, IntegrationId};

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// An adapter returned data.
    Success,
    /// Every route failed, or no route existed.
    Error,
    /// The terminal failure was a timeout.
    Timeout,
    /// The policy gate denied the request before any adapter ran.
    PolicyDenied,
}

/// The telemetry artifact emitted for every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Unique id of this run.
    pub run_id: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Chat scope, when the caller ran inside a chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Calling agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Target integration.
    pub integration_id: IntegrationId,
    /// Requested capability.
    pub capability: Capability,
    /// Backend of the last attempted route; absent when no adapter ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    /// Terminal outcome.
    pub outcome: RunOutcome,
    /// Human-readable summary.
    pub message: String,
    /// Terminal error code for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl RunRecord {
    /// Generate a fresh run id.
    #[must_use]
    pub fn new_run_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_names() {
        assert_eq!(
            serde_json::to_string(&RunOutcome::PolicyDenied).unwrap(),
            "\"policy_denied\""
        );
    }

    #[test]
    fn test_record_serialises_camel_case() {
        let record = RunRecord {
            run_id: "r-1".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 5,
            chat_id: None,
            agent_id: None,
            integration_id: IntegrationId::S3,
            capability: Capability::new("storage.list"),
            backend: Some(Backend::Native),
            outcome: RunOutcome::Success,
            message: "listed 3 objects".to_string(),
            error_code: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("runId").is_some());
        assert!(json.get("durationMs").is_some());
        assert!(json.get("chatId").is_none());
    }
}
