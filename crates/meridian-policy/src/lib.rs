//! Meridian Policy - rule evaluation and approval tracking.
//!
//! This crate provides:
//! - The [`PolicyConfig`] document and its idempotent normalisation
//! - The [`ApprovalStore`] for session and one-shot grants
//! - [`PolicyService::evaluate`], the gate consulted before any adapter runs
//! - The [`PolicyStore`] persistence collaborator trait

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod approvals;
pub mod config;
pub mod error;
pub mod service;

pub use approvals::{ApprovalStore, GLOBAL_SCOPE};
pub use config::{ApprovalMode, CapabilityPolicy, IntegrationPolicy, PolicyConfig};
pub use error::{PolicyError, PolicyResult};
pub use service::{MemoryPolicyStore, PolicyDecision, PolicyQuery, PolicyService, PolicyStore};
