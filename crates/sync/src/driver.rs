//! Async task running a [`ProjectSession`] against a persistence service.
//!
//! The driver owns the session. Edits and external snapshots arrive through
//! a [`SyncHandle`]; timers (debounce, status batching, focus advance) are
//! served from the same `tokio::select!` loop, so the session never needs a
//! lock.
//!
//! Writes are queued to a separate writer task that issues them in order.
//! An edit is answered as soon as local state has changed, never after the
//! remote write. Failed writes come back to the loop as [`WriteFailure`]s.
//! Cancelling the token tears the session down, queues whatever is still
//! pending and waits for the writer to drain before [`SyncDriver::run`]
//! returns.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use worktrack_core::error::CoreError;
use worktrack_core::model::Project;
use worktrack_core::types::EntityId;
use worktrack_events::{EventBus, TrackerEvent};

use crate::edit::Edit;
use crate::error::SyncError;
use crate::persistence::{PersistRequest, Persistence};
use crate::session::ProjectSession;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub enum SessionCommand {
    Edit {
        edit: Edit,
        reply: Option<oneshot::Sender<Result<(), CoreError>>>,
    },
    External(Project),
    Snapshot(oneshot::Sender<Project>),
}

/// Cloneable sender side of a running [`SyncDriver`].
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SyncHandle {
    /// Apply an edit and wait until the session has accepted or rejected it.
    pub async fn edit(&self, edit: Edit) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Edit {
            edit,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| SyncError::ChannelClosed)??;
        Ok(())
    }

    /// Queue an edit without waiting for its outcome.
    pub fn submit(&self, edit: Edit) -> Result<(), SyncError> {
        self.send(SessionCommand::Edit { edit, reply: None })
    }

    /// Deliver an external snapshot (e.g. from a change subscription).
    ///
    /// Never blocks, so it can be called from a persistence callback.
    pub fn deliver_external(&self, project: Project) -> Result<(), SyncError> {
        self.send(SessionCommand::External(project))
    }

    /// Current local view of the project.
    pub async fn snapshot(&self) -> Result<Project, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(tx))?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    fn send(&self, command: SessionCommand) -> Result<(), SyncError> {
        self.tx.send(command).map_err(|_| SyncError::ChannelClosed)
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// A write the writer task could not persist.
#[derive(Debug, Clone)]
pub struct WriteFailure {
    pub entity_id: EntityId,
    pub message: String,
}

pub struct SyncDriver {
    session: ProjectSession,
    persistence: Arc<dyn Persistence>,
    bus: Arc<EventBus>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    /// Queue of the writer task; `None` outside [`run`](Self::run).
    writes: Option<mpsc::UnboundedSender<PersistRequest>>,
    failures_tx: mpsc::UnboundedSender<WriteFailure>,
    failures: mpsc::UnboundedReceiver<WriteFailure>,
    /// Asset just completed and when focus should move past it.
    focus: Option<(EntityId, Instant)>,
}

impl SyncDriver {
    pub fn new(
        session: ProjectSession,
        persistence: Arc<dyn Persistence>,
        bus: Arc<EventBus>,
    ) -> (Self, SyncHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let (failures_tx, failures) = mpsc::unbounded_channel();
        let driver = Self {
            session,
            persistence,
            bus,
            commands,
            writes: None,
            failures_tx,
            failures,
            focus: None,
        };
        (driver, SyncHandle { tx })
    }

    /// Run until cancelled or until every handle is dropped, then flush
    /// pending writes and return the final local project.
    pub async fn run(mut self, cancel: CancellationToken) -> Project {
        tracing::info!(project_id = %self.session.project_id(), "Sync driver started");

        let (writes, queue) = mpsc::unbounded_channel();
        self.writes = Some(writes);
        let writer = tokio::spawn(write_loop(
            Arc::clone(&self.persistence),
            queue,
            self.failures_tx.clone(),
        ));

        loop {
            let wake_at = self.next_wakeup();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        project_id = %self.session.project_id(),
                        "Sync driver cancelled"
                    );
                    break;
                }
                Some(failure) = self.failures.recv() => {
                    self.on_write_failed(failure);
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => {
                            tracing::debug!("All sync handles dropped");
                            break;
                        }
                    }
                }
                _ = sleep_until(wake_at.unwrap_or_else(Instant::now)), if wake_at.is_some() => {
                    self.on_timer(Instant::now());
                }
            }
        }

        self.shutdown(writer).await;
        self.session.snapshot()
    }

    fn next_wakeup(&self) -> Option<Instant> {
        let focus = self.focus.as_ref().map(|(_, at)| *at);
        match (self.session.next_deadline(), focus) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Edit { edit, reply } => {
                let op = edit.name();
                match self.session.apply(edit) {
                    Ok(outcome) => {
                        if let Some(asset_id) = outcome.completed_asset {
                            let delay = self.session.settings().focus_advance_delay;
                            self.focus = Some((asset_id, Instant::now() + delay));
                        }
                        if let Some(reply) = reply {
                            let _ = reply.send(Ok(()));
                        }
                        self.persist(outcome.requests);
                    }
                    Err(e) => {
                        tracing::warn!(op, error = %e, "Edit rejected");
                        if let Some(reply) = reply {
                            let _ = reply.send(Err(e));
                        }
                    }
                }
            }
            SessionCommand::External(project) => {
                self.session.receive_external(project);
                self.publish_events();
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
        }
    }

    fn on_timer(&mut self, now: Instant) {
        let requests = self.session.poll(now);
        self.persist(requests);

        if let Some((from_asset_id, at)) = self.focus.take() {
            if at <= now {
                let to_asset_id = self.session.next_incomplete_asset(&from_asset_id);
                tracing::debug!(
                    project_id = %self.session.project_id(),
                    from = %from_asset_id,
                    to = ?to_asset_id,
                    "Advancing focus"
                );
                self.bus.publish(TrackerEvent::FocusAdvanced {
                    project_id: self.session.project_id().to_string(),
                    from_asset_id,
                    to_asset_id,
                });
            } else {
                self.focus = Some((from_asset_id, at));
            }
        }
    }

    async fn shutdown(&mut self, writer: JoinHandle<()>) {
        let requests = self.session.teardown();
        self.persist(requests);

        // Closing the queue lets the writer finish what is already queued.
        self.writes = None;
        if let Err(e) = writer.await {
            tracing::error!(error = %e, "Write task failed");
        }
        while let Ok(failure) = self.failures.try_recv() {
            self.on_write_failed(failure);
        }
        tracing::info!(project_id = %self.session.project_id(), "Sync driver stopped");
    }

    /// Queue writes for the writer task, in order.
    fn persist(&mut self, requests: Vec<PersistRequest>) {
        if let Some(writes) = &self.writes {
            for request in requests {
                if writes.send(request).is_err() {
                    tracing::error!(
                        project_id = %self.session.project_id(),
                        "Write task is gone, dropping write"
                    );
                }
            }
        }
        self.publish_events();
    }

    /// A failure is reported and local state is kept.
    fn on_write_failed(&mut self, failure: WriteFailure) {
        self.session.on_persist_failed();
        self.bus.publish(TrackerEvent::PersistFailed {
            entity_id: failure.entity_id,
            message: failure.message,
        });
    }

    fn publish_events(&mut self) {
        for event in self.session.drain_events() {
            self.bus.publish(event);
        }
    }
}

/// Issue queued writes one at a time until the queue is closed.
async fn write_loop(
    persistence: Arc<dyn Persistence>,
    mut queue: mpsc::UnboundedReceiver<PersistRequest>,
    failures: mpsc::UnboundedSender<WriteFailure>,
) {
    while let Some(request) = queue.recv().await {
        let entity_id = request.entity.entity_id().to_string();
        match persistence.upsert(request).await {
            Ok(()) => {
                tracing::debug!(entity_id = %entity_id, "Write persisted");
            }
            Err(e) => {
                tracing::error!(entity_id = %entity_id, error = %e, "Write failed");
                let _ = failures.send(WriteFailure {
                    entity_id,
                    message: e.to_string(),
                });
            }
        }
    }
}
