//! Optimistic local state and persistence scheduling for projects.
//!
//! - [`store::OptimisticStore`]: per-collection local state plus the
//!   [`machine::SyncTrack`] state machine deciding when to persist and which
//!   external snapshots to adopt.
//! - [`batcher::StatusChangeBatcher`]: short, deduplicated delay for
//!   derived project status writes.
//! - [`session::ProjectSession`]: owns one project and applies user edits,
//!   recomputing derived statuses synchronously.
//! - [`driver::SyncDriver`]: tokio task running a session against a
//!   [`persistence::Persistence`] implementation.

pub mod batcher;
pub mod config;
pub mod driver;
pub mod edit;
pub mod error;
pub mod fingerprint;
pub mod header;
pub mod machine;
pub mod persistence;
pub mod session;
pub mod store;

pub use config::SyncConfig;
pub use driver::{SyncDriver, SyncHandle};
pub use edit::Edit;
pub use error::SyncError;
pub use persistence::{MemoryPersistence, PersistError, PersistRequest, Persistence};
pub use session::ProjectSession;
