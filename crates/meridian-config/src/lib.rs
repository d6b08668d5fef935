//! Meridian Config - typed integration configuration.
//!
//! This crate provides:
//! - The [`IntegrationConfig`] tagged union, one schema per integration
//! - [`validate`] producing flat `{path, message}` diagnostics
//! - The public/secret [`split`]/[`merge`] pair for separate persistence
//! - The [`ConfigStore`] / [`SecretStore`] collaborator traits, config
//!   layering, and integration status rows

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod secrets;
pub mod store;
pub mod types;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use secrets::{SplitConfig, merge, secret_fields, split};
pub use store::{
    ConfigStore, IntegrationStatus, IntegrationStatusRecord, SecretStore, layer_config,
};
pub use types::{
    GeeConfig, IntegrationConfig, OgcConfig, PostgresConfig, S3Config, UrlConfig,
};
pub use validate::{Diagnostic, validate};
