//! Execution request and terminal result shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::adapter::ErrorCode;
use crate::backend::Backend;
use crate::capability::{Capability, CapabilityKey};
use crate::integration::IntegrationId;

/// A capability invocation as submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Target integration.
    pub integration_id: IntegrationId,
    /// Requested capability.
    pub capability: Capability,
    /// Capability-specific input fields.
    #[serde(default)]
    pub input: Map<String, Value>,
    /// Chat scope for approvals, when the caller runs inside a chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Calling agent, for telemetry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Caller override for the attempt time budget. Zero and absent both
    /// defer to the policy decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Caller override for the retry budget. Absent defers to the policy
    /// decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Caller preference among the policy-allowed backends, order preserved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_backends: Option<Vec<Backend>>,
}

impl ExecutionRequest {
    /// Build a request with empty input and no overrides.
    #[must_use]
    pub fn new(integration_id: IntegrationId, capability: impl Into<Capability>) -> Self {
        Self {
            integration_id,
            capability: capability.into(),
            input: Map::new(),
            chat_id: None,
            agent_id: None,
            timeout_ms: None,
            max_retries: None,
            preferred_backends: None,
        }
    }

    /// The routing key for this request.
    #[must_use]
    pub fn key(&self) -> CapabilityKey {
        CapabilityKey::new(self.integration_id, self.capability.clone())
    }
}

/// Terminal error carried by a failed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Error classification.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Whether the terminal failure was considered retryable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    /// Optional structured diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// One failed adapter attempt, recorded in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// Backend of the route that was attempted.
    pub backend: Backend,
    /// Error code the attempt produced.
    pub error_code: ErrorCode,
    /// Error message the attempt produced.
    pub message: String,
    /// Zero-based attempt index within the route.
    pub attempt: u32,
}

/// The terminal result of one `execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionResult {
    /// An adapter returned data.
    #[serde(rename_all = "camelCase")]
    Success {
        /// Unique id of this run.
        run_id: String,
        /// Target integration.
        integration_id: IntegrationId,
        /// Requested capability.
        capability: Capability,
        /// Backend of the winning route.
        backend: Backend,
        /// Wall-clock duration of the whole call in milliseconds.
        duration_ms: u64,
        /// Capability-specific payload.
        data: Value,
        /// Optional structured diagnostics from the winning adapter.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    /// Every route was exhausted, or the gate denied the request.
    #[serde(rename_all = "camelCase")]
    Failure {
        /// Unique id of this run.
        run_id: String,
        /// Target integration.
        integration_id: IntegrationId,
        /// Requested capability.
        capability: Capability,
        /// Backend of the last attempted route, absent when no adapter ran.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backend: Option<Backend>,
        /// Wall-clock duration of the whole call in milliseconds.
        duration_ms: u64,
        /// The terminal error.
        error: ExecutionError,
        /// Every failed attempt, in order.
        #[serde(default)]
        attempts: Vec<AttemptRecord>,
    },
}

impl ExecutionResult {
    /// Whether this result is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        match self {
            Self::Success { run_id, .. } | Self::Failure { run_id, .. } => run_id,
        }
    }

    /// The wire envelope forwarded by tool-pack wrappers: a flat object with
    /// a `status` discriminator and snake_case keys.
    #[must_use]
    pub fn into_envelope(self) -> Value {
        match self {
            Self::Success {
                run_id,
                backend,
                duration_ms,
                data,
                details,
                ..
            } => {
                let mut envelope = json!({
                    "status": "success",
                    "run_id": run_id,
                    "backend": backend,
                    "duration_ms": duration_ms,
                    "data": data,
                });
                if let (Some(details), Some(obj)) = (details, envelope.as_object_mut()) {
                    obj.insert("details".to_string(), details);
                }
                envelope
            },
            Self::Failure {
                run_id,
                backend,
                duration_ms,
                error,
                attempts,
                ..
            } => {
                let mut envelope = json!({
                    "status": "error",
                    "run_id": run_id,
                    "duration_ms": duration_ms,
                    "error_code": error.code,
                    "message": error.message,
                });
                if let Some(obj) = envelope.as_object_mut() {
                    if let Some(backend) = backend {
                        obj.insert("backend".to_string(), json!(backend));
                    }
                    if !attempts.is_empty() {
                        obj.insert("attempts".to_string(), json!(attempts));
                    }
                }
                envelope
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_key() {
        let req = ExecutionRequest::new(IntegrationId::S3, "storage.list");
        assert_eq!(req.key().to_string(), "s3/storage.list");
    }

    #[test]
    fn test_success_envelope() {
        let result = ExecutionResult::Success {
            run_id: "r-1".to_string(),
            integration_id: IntegrationId::Stac,
            capability: Capability::new("catalog.search"),
            backend: Backend::Native,
            duration_ms: 12,
            data: json!({"ok": true}),
            details: None,
        };
        let envelope = result.into_envelope();
        assert_eq!(envelope["status"], "success");
        assert_eq!(envelope["run_id"], "r-1");
        assert_eq!(envelope["backend"], "native");
        assert!(envelope.get("details").is_none());
    }

    #[test]
    fn test_failure_envelope_omits_absent_backend() {
        let result = ExecutionResult::Failure {
            run_id: "r-2".to_string(),
            integration_id: IntegrationId::S3,
            capability: Capability::new("storage.list"),
            backend: None,
            duration_ms: 3,
            error: ExecutionError {
                code: ErrorCode::PolicyDenied,
                message: "Integration s3 is disabled by policy".to_string(),
                retryable: None,
                details: None,
            },
            attempts: Vec::new(),
        };
        let envelope = result.into_envelope();
        assert_eq!(envelope["status"], "error");
        assert_eq!(envelope["error_code"], "POLICY_DENIED");
        assert!(envelope.get("backend").is_none());
        assert!(envelope.get("attempts").is_none());
    }
}
