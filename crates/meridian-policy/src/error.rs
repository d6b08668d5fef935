//! Policy error types.

use thiserror::Error;

/// Errors surfaced by the policy service.
#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    /// The persistence collaborator failed.
    #[error("policy store error: {0}")]
    Store(String),

    /// The policy document could not be decoded.
    #[error("invalid policy document: {0}")]
    InvalidDocument(String),
}

/// Convenience alias for policy results.
pub type PolicyResult<T> = Result<T, PolicyError>;
