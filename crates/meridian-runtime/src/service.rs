//! The execution service — policy gate, routing, attempts, telemetry.
//!
//! One `execute` call walks the outer state machine: evaluate policy,
//! resolve routes, attempt each route under a timeout race with retries,
//! fall back across backends, and emit exactly one [`RunRecord`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use meridian_audit::{RunLogger, RunOutcome, RunRecord};
use meridian_core::{
    AdapterContext, AdapterFailure, AdapterResult, AttemptRecord, Backend, Capability,
    ErrorCode, ExecutionError, ExecutionRequest, ExecutionResult, IntegrationId,
};
use meridian_policy::{ApprovalMode, PolicyQuery, PolicyService};
use meridian_registry::{CapabilityRegistry, CapabilitySummary};

/// Lifecycle events synthesised into run records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A connection test was run.
    TestConnection,
    /// The integration was connected.
    Connect,
    /// The integration was disconnected.
    Disconnect,
}

impl LifecycleEvent {
    const fn as_str(self) -> &'static str {
        match self {
            Self::TestConnection => "testConnection",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        }
    }
}

/// One lifecycle observation to record.
#[derive(Debug, Clone)]
pub struct LifecycleLog {
    /// The integration the event concerns.
    pub integration_id: IntegrationId,
    /// What happened.
    pub event: LifecycleEvent,
    /// Whether it succeeded.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// How long it took.
    pub duration_ms: u64,
}

/// How one attempt ended without an adapter result.
enum AttemptInterrupt {
    TimedOut,
    Cancelled,
}

/// The top-level state machine over registry, policy, and telemetry.
pub struct ExecutionService {
    registry: Arc<CapabilityRegistry>,
    policy: Arc<PolicyService>,
    logger: Arc<RunLogger>,
}

impl ExecutionService {
    /// Compose a service from its three subsystems.
    #[must_use]
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        policy: Arc<PolicyService>,
        logger: Arc<RunLogger>,
    ) -> Self {
        Self {
            registry,
            policy,
            logger,
        }
    }

    /// The capability registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// The policy service.
    #[must_use]
    pub fn policy(&self) -> &Arc<PolicyService> {
        &self.policy
    }

    /// Execute a capability request.
    pub async fn execute(&self, req: &ExecutionRequest) -> ExecutionResult {
        self.execute_cancellable(req, CancellationToken::new()).await
    }

    /// Execute a capability request under a caller-supplied cancellation
    /// signal. Cancellation interrupts the current attempt and terminates
    /// the run with `EXECUTION_FAILED`; a fired timer stays `TIMEOUT`.
    pub async fn execute_cancellable(
        &self,
        req: &ExecutionRequest,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = std::time::Instant::now();

        // -- Evaluating --
        let decision = self
            .policy
            .evaluate(&PolicyQuery {
                integration_id: req.integration_id,
                capability: req.capability.clone(),
                chat_id: req.chat_id.clone(),
            })
            .await;

        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| "Request denied by policy".to_string());
            let code = if reason.to_lowercase().contains("approval required") {
                ErrorCode::ApprovalRequired
            } else {
                ErrorCode::PolicyDenied
            };
            tracing::debug!(key = %req.key(), code = %code, "policy gate denied request");

            let duration_ms = elapsed_ms(start);
            self.logger.log(RunRecord {
                run_id: run_id.clone(),
                started_at,
                finished_at: Utc::now(),
                duration_ms,
                chat_id: req.chat_id.clone(),
                agent_id: req.agent_id.clone(),
                integration_id: req.integration_id,
                capability: req.capability.clone(),
                backend: None,
                outcome: RunOutcome::PolicyDenied,
                message: reason.clone(),
                error_code: Some(code),
            });
            return ExecutionResult::Failure {
                run_id,
                integration_id: req.integration_id,
                capability: req.capability.clone(),
                backend: None,
                duration_ms,
                error: ExecutionError {
                    code,
                    message: reason,
                    retryable: None,
                    details: None,
                },
                attempts: Vec::new(),
            };
        }

        // -- Routing --
        let denied: Vec<Backend> = Backend::ALL
            .iter()
            .copied()
            .filter(|b| !decision.allowed_backends.contains(b))
            .collect();
        let preferred: Vec<Backend> = match &req.preferred_backends {
            Some(preferred) => preferred
                .iter()
                .copied()
                .filter(|b| decision.allowed_backends.contains(b))
                .collect(),
            None => decision.allowed_backends.clone(),
        };
        let routes = self.registry.resolve(
            req.integration_id,
            &req.capability,
            Some(&preferred),
            Some(&denied),
        );

        if routes.is_empty() {
            let message = format!("No backend supports {}", req.key());
            let duration_ms = elapsed_ms(start);
            self.logger.log(RunRecord {
                run_id: run_id.clone(),
                started_at,
                finished_at: Utc::now(),
                duration_ms,
                chat_id: req.chat_id.clone(),
                agent_id: req.agent_id.clone(),
                integration_id: req.integration_id,
                capability: req.capability.clone(),
                backend: None,
                outcome: RunOutcome::Error,
                message: message.clone(),
                error_code: Some(ErrorCode::UnsupportedCapability),
            });
            return ExecutionResult::Failure {
                run_id,
                integration_id: req.integration_id,
                capability: req.capability.clone(),
                backend: None,
                duration_ms,
                error: ExecutionError {
                    code: ErrorCode::UnsupportedCapability,
                    message,
                    retryable: None,
                    details: None,
                },
                attempts: Vec::new(),
            };
        }

        // -- Attempting --
        let timeout_ms = match req.timeout_ms {
            Some(timeout_ms) if timeout_ms > 0 => timeout_ms,
            _ => decision.timeout_ms,
        };
        let max_retries = req.max_retries.unwrap_or(decision.max_retries);

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_failure: Option<(Backend, AdapterFailure)> = None;
        let mut cancelled = false;

        'routes: for route in &routes {
            let backend = route.backend();
            let mut attempt: u32 = 0;
            while attempt <= max_retries {
                let ctx = AdapterContext {
                    timeout_ms,
                    attempt,
                    max_retries,
                };
                let outcome =
                    run_with_timeout(route.adapter.execute(req, &ctx), timeout_ms, &cancel).await;

                match outcome {
                    Ok(AdapterResult::Success { data, details }) => {
                        let duration_ms = elapsed_ms(start);
                        self.logger.log(RunRecord {
                            run_id: run_id.clone(),
                            started_at,
                            finished_at: Utc::now(),
                            duration_ms,
                            chat_id: req.chat_id.clone(),
                            agent_id: req.agent_id.clone(),
                            integration_id: req.integration_id,
                            capability: req.capability.clone(),
                            backend: Some(backend),
                            outcome: RunOutcome::Success,
                            message: format!("{} succeeded via {backend}", req.key()),
                            error_code: None,
                        });
                        return ExecutionResult::Success {
                            run_id,
                            integration_id: req.integration_id,
                            capability: req.capability.clone(),
                            backend,
                            duration_ms,
                            data,
                            details,
                        };
                    },
                    Ok(AdapterResult::Failure { error }) => {
                        tracing::debug!(
                            key = %req.key(),
                            backend = %backend,
                            attempt,
                            code = %error.code,
                            "adapter attempt failed"
                        );
                        attempts.push(AttemptRecord {
                            backend,
                            error_code: error.code,
                            message: error.message.clone(),
                            attempt,
                        });
                        let retryable = error.retryable;
                        last_failure = Some((backend, error));
                        if !retryable {
                            // Terminal on this route; fall back to the next
                            // backend.
                            continue 'routes;
                        }
                    },
                    Err(AttemptInterrupt::TimedOut) => {
                        let failure = AdapterFailure {
                            code: ErrorCode::Timeout,
                            message: format!("attempt timed out after {timeout_ms}ms"),
                            details: None,
                            retryable: true,
                        };
                        attempts.push(AttemptRecord {
                            backend,
                            error_code: failure.code,
                            message: failure.message.clone(),
                            attempt,
                        });
                        last_failure = Some((backend, failure));
                    },
                    Err(AttemptInterrupt::Cancelled) => {
                        let failure = AdapterFailure {
                            code: ErrorCode::ExecutionFailed,
                            message: "execution was cancelled".to_string(),
                            details: None,
                            retryable: false,
                        };
                        attempts.push(AttemptRecord {
                            backend,
                            error_code: failure.code,
                            message: failure.message.clone(),
                            attempt,
                        });
                        last_failure = Some((backend, failure));
                        cancelled = true;
                        break 'routes;
                    },
                }

                attempt = attempt.saturating_add(1);
            }
        }

        // -- Exhausted --
        let (backend, error) = last_failure.unwrap_or((
            routes[0].backend(),
            AdapterFailure {
                code: ErrorCode::ExecutionFailed,
                message: "all backends failed".to_string(),
                details: None,
                retryable: false,
            },
        ));
        let outcome = if !cancelled && error.code == ErrorCode::Timeout {
            RunOutcome::Timeout
        } else {
            RunOutcome::Error
        };

        let duration_ms = elapsed_ms(start);
        self.logger.log(RunRecord {
            run_id: run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            chat_id: req.chat_id.clone(),
            agent_id: req.agent_id.clone(),
            integration_id: req.integration_id,
            capability: req.capability.clone(),
            backend: Some(backend),
            outcome,
            message: error.message.clone(),
            error_code: Some(error.code),
        });
        ExecutionResult::Failure {
            run_id,
            integration_id: req.integration_id,
            capability: req.capability.clone(),
            backend: Some(backend),
            duration_ms,
            error: ExecutionError {
                code: error.code,
                message: error.message,
                retryable: Some(error.retryable),
                details: error.details,
            },
            attempts,
        }
    }

    /// Aggregate capability listing, passed through from the registry.
    #[must_use]
    pub fn get_capabilities(&self) -> Vec<CapabilitySummary> {
        self.registry.list_capabilities()
    }

    /// Newest-first run records, clamped to the logger's cap.
    #[must_use]
    pub fn get_run_logs(&self, limit: usize) -> Vec<RunRecord> {
        self.logger.list(limit)
    }

    /// Drop all run records.
    pub fn clear_run_logs(&self) {
        self.logger.clear();
    }

    /// Grant an approval. `Always` needs none and is a no-op.
    pub fn grant_approval(
        &self,
        mode: ApprovalMode,
        integration_id: IntegrationId,
        capability: &Capability,
        chat_id: Option<&str>,
    ) {
        match mode {
            ApprovalMode::Always => {},
            ApprovalMode::Session => {
                if let Some(chat_id) = chat_id {
                    self.policy
                        .grant_session_approval(chat_id, integration_id, capability);
                }
            },
            ApprovalMode::Once => {
                self.policy
                    .grant_one_time_approval(chat_id, integration_id, capability);
            },
        }
    }

    /// Clear approvals: all of them, or one chat's.
    pub fn clear_approvals(&self, chat_id: Option<&str>) {
        self.policy.clear_session_approvals(chat_id);
    }

    /// Synthesise a run record for an integration lifecycle event.
    pub fn log_lifecycle_event(&self, event: LifecycleLog) {
        let now = Utc::now();
        let duration = chrono::Duration::milliseconds(i64::try_from(event.duration_ms).unwrap_or(0));
        let started_at = now.checked_sub_signed(duration).unwrap_or(now);
        self.logger.log(RunRecord {
            run_id: Uuid::new_v4().to_string(),
            started_at,
            finished_at: now,
            duration_ms: event.duration_ms,
            chat_id: None,
            agent_id: None,
            integration_id: event.integration_id,
            capability: Capability::new(format!("lifecycle.{}", event.event.as_str())),
            backend: None,
            outcome: if event.success {
                RunOutcome::Success
            } else {
                RunOutcome::Error
            },
            message: event.message,
            error_code: None,
        });
    }
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService").finish_non_exhaustive()
    }
}

fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Race an adapter attempt against its time budget and the cancellation
/// signal. The timer is dropped (cancelled) as soon as the adapter
/// resolves.
async fn run_with_timeout<F>(
    attempt: F,
    timeout_ms: u64,
    cancel: &CancellationToken,
) -> Result<AdapterResult, AttemptInterrupt>
where
    F: Future<Output = AdapterResult>,
{
    tokio::select! {
        outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), attempt) => {
            outcome.map_err(|_| AttemptInterrupt::TimedOut)
        },
        () = cancel.cancelled() => Err(AttemptInterrupt::Cancelled),
    }
}
