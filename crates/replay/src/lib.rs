//! Replays a scripted editing session against a project fixture.
//!
//! A fixture is a JSON document:
//!
//! ```json
//! {
//!   "statuses": [ ... ],            // optional, defaults to the built-in catalog
//!   "project": { ... },             // legacy or canonical project record
//!   "steps": [
//!     { "op": "toggle_action", "asset_id": "a1", "action_id": "x1", "checked": true },
//!     { "wait_ms": 400 },
//!     { "external": { ... } }       // a project record changed elsewhere
//!   ]
//! }
//! ```
//!
//! Every step runs through a [`SyncDriver`] backed by [`MemoryPersistence`],
//! which echoes accepted writes back as external snapshots.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use worktrack_core::error::CoreError;
use worktrack_core::model::Project;
use worktrack_core::normalize::normalize_project_json;
use worktrack_core::progress::ProgressSummary;
use worktrack_core::status_config::{StatusCatalog, StatusConfigProvider, StatusDefinition};
use worktrack_core::status_policy::StatusPolicy;
use worktrack_events::{EventBus, TrackerEventEnvelope};
use worktrack_sync::{
    Edit, MemoryPersistence, PersistRequest, ProjectSession, SyncConfig, SyncDriver, SyncError,
    SyncHandle,
};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub statuses: Option<Vec<StatusDefinition>>,
    pub project: serde_json::Value,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Wait { wait_ms: u64 },
    External { external: serde_json::Value },
    Edit(Edit),
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub project: Project,
    pub progress: ProgressSummary,
    /// Writes accepted by the in-memory persistence, in order.
    pub writes: Vec<PersistRequest>,
    pub events: Vec<TrackerEventEnvelope>,
    /// Edits the session refused, as `(step index, message)`.
    pub rejected: Vec<(usize, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Failed to read fixture: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed fixture: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Sync driver task failed: {0}")]
    Task(String),
}

/// Read a fixture from a JSON file.
pub fn load_fixture(path: &std::path::Path) -> Result<Fixture, ReplayError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Run every step of `fixture` and return the final state.
pub async fn replay(fixture: Fixture, settings: SyncConfig) -> Result<ReplayReport, ReplayError> {
    let catalog: Arc<dyn StatusConfigProvider> = match fixture.statuses {
        Some(definitions) => Arc::new(StatusCatalog::new(definitions)?),
        None => Arc::new(StatusCatalog::builtin()),
    };
    let project = normalize_project_json(fixture.project, catalog.as_ref())?;
    tracing::info!(
        project_id = %project.id,
        assets = project.actionable_items.len(),
        steps = fixture.steps.len(),
        "Replaying fixture"
    );

    let slot: Arc<OnceLock<SyncHandle>> = Arc::new(OnceLock::new());
    let echo_slot = Arc::clone(&slot);
    let persistence = Arc::new(MemoryPersistence::new(project.clone()).with_echo(
        move |snapshot| {
            if let Some(handle) = echo_slot.get() {
                if handle.deliver_external(snapshot).is_err() {
                    tracing::debug!("Echo dropped, driver already stopped");
                }
            }
        },
    ));

    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();
    let session = ProjectSession::new(
        project,
        Arc::clone(&catalog),
        StatusPolicy::default(),
        settings,
    );
    let (driver, handle) = SyncDriver::new(session, persistence.clone(), bus);
    let _ = slot.set(handle.clone());

    let cancel = CancellationToken::new();
    let task = tokio::spawn(driver.run(cancel.clone()));

    let mut rejected = Vec::new();
    for (index, step) in fixture.steps.into_iter().enumerate() {
        match step {
            Step::Wait { wait_ms } => tokio::time::sleep(Duration::from_millis(wait_ms)).await,
            Step::External { external } => {
                let project = normalize_project_json(external, catalog.as_ref())?;
                handle.deliver_external(project)?;
            }
            Step::Edit(edit) => {
                let op = edit.name();
                match handle.edit(edit).await {
                    Ok(()) => tracing::debug!(step = index, op, "Step applied"),
                    Err(SyncError::Core(e)) => {
                        tracing::warn!(step = index, op, error = %e, "Step rejected");
                        rejected.push((index, e.to_string()));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    cancel.cancel();
    let project = task.await.map_err(|e| ReplayError::Task(e.to_string()))?;

    let mut collected = Vec::new();
    while let Ok(envelope) = events.try_recv() {
        collected.push(envelope);
    }

    Ok(ReplayReport {
        progress: ProgressSummary::of(&project.actionable_items),
        project,
        writes: persistence.requests(),
        events: collected,
        rejected,
    })
}
