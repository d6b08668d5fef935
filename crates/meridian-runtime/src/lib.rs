//! Meridian Runtime - the connector execution service.
//!
//! Composes the capability registry, policy service, and run logger into
//! the [`ExecutionService`] state machine, and wires the default native and
//! remote routes.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod service;
pub mod wiring;

pub use service::{ExecutionService, LifecycleEvent, LifecycleLog};
pub use wiring::{MCP_PRIORITY, NATIVE_PRIORITY, register_default_routes};
