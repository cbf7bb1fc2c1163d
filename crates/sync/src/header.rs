//! The scalar part of a project, synced independently of its lists.

use serde::{Deserialize, Serialize};
use worktrack_core::model::Project;
use worktrack_core::status_policy::completed_at_after;
use worktrack_core::types::{names_match, normalize_name, Timestamp};

use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectHeader {
    pub name: String,
    pub status: String,
    pub completed_at: Option<Timestamp>,
}

impl ProjectHeader {
    /// Set the status, stamping or clearing `completed_at` in the same
    /// write. Returns `true` if the status changed.
    pub fn apply_status(&mut self, status: &str, now: Timestamp) -> bool {
        let changed = !names_match(&self.status, status);
        self.completed_at = completed_at_after(&self.status, self.completed_at, status, now);
        self.status = status.to_string();
        changed
    }
}

impl From<&Project> for ProjectHeader {
    fn from(project: &Project) -> Self {
        Self {
            name: project.name.clone(),
            status: project.status.clone(),
            completed_at: project.completed_at,
        }
    }
}

impl Fingerprint for ProjectHeader {
    type Print = (String, String, bool);

    /// Only whether `completed_at` is set matters; its exact value is
    /// stamped independently on each side.
    fn fingerprint(&self) -> Self::Print {
        (
            self.name.clone(),
            normalize_name(&self.status),
            self.completed_at.is_some(),
        )
    }
}
