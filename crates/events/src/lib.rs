//! In-process event bus for the status engine.
//!
//! - [`EventBus`]: publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`TrackerEvent`]: status changes, auto-triggers, persistence failures,
//!   adopted external updates and focus advances.

pub mod bus;

pub use bus::{EventBus, TrackerEvent, TrackerEventEnvelope};
