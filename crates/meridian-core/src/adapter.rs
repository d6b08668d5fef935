//! The adapter contract shared by every backend implementation.
//!
//! An adapter is the executable for one or more routes. It is stateless per
//! call: the execution service hands it the request plus an
//! [`AdapterContext`] describing the attempt, and consumes only the tag and
//! a small set of fields of the returned [`AdapterResult`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::Backend;
use crate::capability::CapabilityKey;
use crate::execution::ExecutionRequest;

/// The fixed error-code taxonomy shared by adapters and the execution
/// service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The integration has no usable configuration.
    NotConfigured,
    /// No adapter serves the requested capability.
    UnsupportedCapability,
    /// The policy gate denied the request.
    PolicyDenied,
    /// The policy gate requires a user approval that is not present.
    ApprovalRequired,
    /// The attempt exceeded its time budget.
    Timeout,
    /// The request input failed validation.
    ValidationFailed,
    /// No remote server exposes the mapped tool, or the mapping is ambiguous.
    RemoteToolUnavailable,
    /// The pinned remote server does not expose the mapped tool.
    RemoteServerUnavailable,
    /// The adapter ran and failed.
    ExecutionFailed,
}

impl ErrorCode {
    /// The wire name for this code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::UnsupportedCapability => "UNSUPPORTED_CAPABILITY",
            Self::PolicyDenied => "POLICY_DENIED",
            Self::ApprovalRequired => "APPROVAL_REQUIRED",
            Self::Timeout => "TIMEOUT",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::RemoteToolUnavailable => "REMOTE_TOOL_UNAVAILABLE",
            Self::RemoteServerUnavailable => "REMOTE_SERVER_UNAVAILABLE",
            Self::ExecutionFailed => "EXECUTION_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed adapter attempt.
///
/// This shape never crosses the wire; the execution service folds it into
/// [`ExecutionError`](crate::execution::ExecutionError) and the attempt log.
#[derive(Debug, Clone)]
pub struct AdapterFailure {
    /// Error classification.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional structured diagnostics.
    pub details: Option<Value>,
    /// Whether the execution service may retry this attempt on the same
    /// route. Defaults to `false`; timeouts and transient 5xx responses set
    /// it.
    pub retryable: bool,
}

/// Result of one adapter attempt.
#[derive(Debug, Clone)]
pub enum AdapterResult {
    /// The attempt produced data.
    Success {
        /// Capability-specific payload.
        data: Value,
        /// Optional structured diagnostics (probe statuses, truncation
        /// flags, ...).
        details: Option<Value>,
    },
    /// The attempt failed.
    Failure {
        /// The failure.
        error: AdapterFailure,
    },
}

impl AdapterResult {
    /// Build a success result.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self::Success {
            data,
            details: None,
        }
    }

    /// Build a success result with diagnostics.
    #[must_use]
    pub fn success_with_details(data: Value, details: Value) -> Self {
        Self::Success {
            data,
            details: Some(details),
        }
    }

    /// Build a non-retryable failure.
    #[must_use]
    pub fn fail(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Failure {
            error: AdapterFailure {
                code,
                message: message.into(),
                details: None,
                retryable: false,
            },
        }
    }

    /// Build a retryable failure.
    #[must_use]
    pub fn fail_retryable(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Failure {
            error: AdapterFailure {
                code,
                message: message.into(),
                details: None,
                retryable: true,
            },
        }
    }

    /// Build a failure with structured diagnostics.
    #[must_use]
    pub fn fail_with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: Value,
        retryable: bool,
    ) -> Self {
        Self::Failure {
            error: AdapterFailure {
                code,
                message: message.into(),
                details: Some(details),
                retryable,
            },
        }
    }

    /// Whether this result is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Per-attempt context handed to an adapter.
#[derive(Debug, Clone, Copy)]
pub struct AdapterContext {
    /// Time budget for this attempt in milliseconds.
    pub timeout_ms: u64,
    /// Zero-based attempt index within the current route.
    pub attempt: u32,
    /// Maximum retry count the execution service will make on this route.
    pub max_retries: u32,
}

/// The executable for a route.
///
/// Adapters are owned by the registry for the process lifetime and must not
/// keep per-call state; collaborator handles (config store, SQL pool, remote
/// tool bus) are the only long-lived members.
#[async_trait]
pub trait ConnectorAdapter: Send + Sync {
    /// Stable identifier for telemetry.
    fn id(&self) -> &str;

    /// The backend this adapter implements.
    fn backend(&self) -> Backend;

    /// Whether this adapter can serve the given routing key.
    fn supports(&self, key: &CapabilityKey) -> bool;

    /// Run one attempt.
    async fn execute(&self, req: &ExecutionRequest, ctx: &AdapterContext) -> AdapterResult;
}
