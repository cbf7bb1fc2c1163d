//! Status derivation for hierarchical work items (projects → assets →
//! actions).
//!
//! This crate has no I/O and no async: every function is evaluated against
//! data passed in by the caller, with status configuration injected through
//! [`status_config::StatusConfigProvider`].

pub mod auto_check;
pub mod auto_trigger;
pub mod error;
pub mod model;
pub mod mutations;
pub mod normalize;
pub mod progress;
pub mod status_config;
pub mod status_policy;
pub mod types;
pub mod workflow;
