use worktrack_core::error::CoreError;

use crate::persistence::PersistError;

/// Errors surfaced by the sync layer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A domain-level error from `worktrack_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The persistence collaborator rejected or failed a write.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// The driver task has stopped and no longer accepts commands.
    #[error("Sync driver is no longer running")]
    ChannelClosed,
}
