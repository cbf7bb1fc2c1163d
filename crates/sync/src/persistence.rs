//! Boundary to the record-level upsert service.
//!
//! The engine only ever issues partial updates of one project or one asset.
//! [`MemoryPersistence`] keeps a remote copy in memory and can loop every
//! accepted write back as an external snapshot, which is how the replay
//! tool and the tests exercise echo suppression.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use worktrack_core::model::{Action, Asset, Collaborator, Project};
use worktrack_core::types::{EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// The record a write targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRef {
    Project {
        project_id: EntityId,
    },
    Asset {
        project_id: EntityId,
        asset_id: EntityId,
    },
}

impl EntityRef {
    /// Id of the record itself (the asset id for asset writes).
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Project { project_id } => project_id,
            Self::Asset { asset_id, .. } => asset_id,
        }
    }
}

/// Fields to overwrite. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    /// `Some(None)` clears the stored timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Option<Timestamp>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actionable_items: Option<Vec<Asset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborators: Option<Vec<Collaborator>>,
}

/// One write issued by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistRequest {
    pub entity: EntityRef,
    pub update: PartialUpdate,
    /// Set when the write promotes the project through an action trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_status: Option<String>,
}

impl PersistRequest {
    pub fn project(project_id: impl Into<EntityId>, update: PartialUpdate) -> Self {
        Self {
            entity: EntityRef::Project {
                project_id: project_id.into(),
            },
            update,
            triggered_status: None,
        }
    }

    pub fn asset(
        project_id: impl Into<EntityId>,
        asset_id: impl Into<EntityId>,
        update: PartialUpdate,
    ) -> Self {
        Self {
            entity: EntityRef::Asset {
                project_id: project_id.into(),
                asset_id: asset_id.into(),
            },
            update,
            triggered_status: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    /// The service refused the write (validation, permissions, unknown id).
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// The service could not be reached.
    #[error("Persistence unavailable: {0}")]
    Unavailable(String),
}

/// Record-level upsert service.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn upsert(&self, request: PersistRequest) -> Result<(), PersistError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

type EchoFn = Box<dyn Fn(Project) + Send + Sync>;

struct MemoryState {
    remote: Project,
    log: Vec<PersistRequest>,
    fail_next: Option<PersistError>,
}

/// In-memory persistence holding a single remote project.
pub struct MemoryPersistence {
    state: Mutex<MemoryState>,
    on_write: Option<EchoFn>,
}

impl MemoryPersistence {
    pub fn new(remote: Project) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                remote,
                log: Vec::new(),
                fail_next: None,
            }),
            on_write: None,
        }
    }

    /// Call `echo` with the full remote project after every accepted write.
    pub fn with_echo(mut self, echo: impl Fn(Project) + Send + Sync + 'static) -> Self {
        self.on_write = Some(Box::new(echo));
        self
    }

    /// Make the next write fail with `error`.
    pub fn fail_next(&self, error: PersistError) {
        self.lock().fail_next = Some(error);
    }

    pub fn remote(&self) -> Project {
        self.lock().remote.clone()
    }

    /// Every accepted write, in order.
    pub fn requests(&self) -> Vec<PersistRequest> {
        self.lock().log.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a panicking test thread; the data is
        // still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn upsert(&self, request: PersistRequest) -> Result<(), PersistError> {
        let snapshot = {
            let mut state = self.lock();
            if let Some(error) = state.fail_next.take() {
                return Err(error);
            }
            apply_update(&mut state.remote, &request)?;
            state.log.push(request);
            state.remote.clone()
        };

        if let Some(echo) = &self.on_write {
            echo(snapshot);
        }
        Ok(())
    }
}

/// Apply a partial update to a stored project.
pub fn apply_update(project: &mut Project, request: &PersistRequest) -> Result<(), PersistError> {
    let update = &request.update;
    match &request.entity {
        EntityRef::Project { project_id } => {
            if *project_id != project.id {
                return Err(PersistError::Rejected(format!(
                    "Unknown project {project_id}"
                )));
            }
            if let Some(name) = &update.name {
                project.name = name.clone();
            }
            if let Some(status) = &update.status {
                project.status = status.clone();
            }
            if let Some(completed_at) = update.completed_at {
                project.completed_at = completed_at;
            }
            if let Some(assets) = &update.actionable_items {
                project.actionable_items = assets.clone();
            }
            if let Some(collaborators) = &update.collaborators {
                project.collaborators = collaborators.clone();
            }
        }
        EntityRef::Asset {
            project_id,
            asset_id,
        } => {
            if *project_id != project.id {
                return Err(PersistError::Rejected(format!(
                    "Unknown project {project_id}"
                )));
            }
            let asset = project
                .find_asset_mut(asset_id)
                .ok_or_else(|| PersistError::Rejected(format!("Unknown asset {asset_id}")))?;
            if let Some(name) = &update.name {
                asset.name = name.clone();
            }
            if let Some(status) = &update.status {
                asset.status = status.clone();
            }
            if let Some(is_completed) = update.is_completed {
                asset.is_completed = is_completed;
            }
            if let Some(actions) = &update.actions {
                asset.actions = actions.clone();
            }
            if let Some(collaborators) = &update.collaborators {
                asset.collaborators = collaborators.clone();
            }
        }
    }
    Ok(())
}
