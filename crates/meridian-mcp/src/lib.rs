//! Meridian MCP - the remote tool-bus backend.
//!
//! The [`RemoteAdapter`] routes capabilities to named tools on an
//! externally-hosted registry reached through the [`RemoteToolBus`]
//! collaborator. Native adapters outrank it in the default wiring; the bus
//! is the fallback backend.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod adapter;
pub mod bus;

pub use adapter::{RemoteAdapter, RemoteToolMapping, default_mappings};
pub use bus::{DiscoveredTool, RemoteBusError, RemoteToolBus};
