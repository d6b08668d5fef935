//! Meridian Core - Foundation types for the connector execution gateway.
//!
//! This crate provides:
//! - The closed [`IntegrationId`] and [`Backend`] sets
//! - [`Capability`] names and [`CapabilityKey`] routing keys
//! - The [`ConnectorAdapter`] contract and [`AdapterResult`] tagged union
//! - [`ExecutionRequest`] / [`ExecutionResult`] wire shapes
//! - Shared timeout and retry bounds

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod adapter;
pub mod backend;
pub mod capability;
pub mod execution;
pub mod integration;
pub mod limits;

pub use adapter::{AdapterContext, AdapterFailure, AdapterResult, ConnectorAdapter, ErrorCode};
pub use backend::{Backend, UnknownBackend};
pub use capability::{Capability, CapabilityKey};
pub use execution::{AttemptRecord, ExecutionError, ExecutionRequest, ExecutionResult};
pub use integration::{IntegrationId, UnknownIntegrationId};
pub use limits::{
    DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS, MAX_RETRIES, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS,
    clamp_retries, clamp_timeout_ms,
};
