//! Meridian Audit - structured run telemetry.
//!
//! Every `execute` call on the execution service emits exactly one
//! [`RunRecord`], retained newest-first in the bounded [`RunLogger`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod logger;
pub mod record;

pub use logger::{DEFAULT_CAPACITY, MIN_CAPACITY, RunLogger};
pub use record::{RunOutcome, RunRecord};
