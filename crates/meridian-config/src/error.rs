//! Configuration error types.

use thiserror::Error;

/// Errors surfaced by config loading, splitting, and merging.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The underlying store failed.
    #[error("config store error: {0}")]
    Store(String),

    /// A config failed to serialise.
    #[error("config serialization failed: {0}")]
    Serialization(String),

    /// A stored object does not match the integration's schema.
    #[error("invalid integration config: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for config results.
pub type ConfigResult<T> = Result<T, ConfigError>;
