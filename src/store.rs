//! Collaborator interfaces for persisted deployment state.
//!
//! The orchestrator consumes these traits; the hosted relational
//! store behind them is an external system. Implementations must key
//! writes by deployment id — the orchestrator never shares a record
//! between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeployResult;
use crate::target::VpsTarget;

/// Lifecycle state of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl DeployStatus {
    /// Terminal states are reached exactly once and never left.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The persisted lifecycle entity for one deployment run.
///
/// Created with status `pending` before any remote call; mutated by
/// the orchestrator as steps succeed or fail; never deleted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub vps_target_id: String,
    pub workflow_id: Option<String>,
    pub status: DeployStatus,
    pub logs: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Partial update applied to a [`DeploymentRecord`]. Unset fields are
/// left untouched by the store.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub status: Option<DeployStatus>,
    pub logs: Option<Vec<String>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    #[must_use]
    pub const fn status(mut self, status: DeployStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn logs(mut self, logs: Vec<String>) -> Self {
        self.logs = Some(logs);
        self
    }

    #[must_use]
    pub const fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
}

/// Append/update interface for deployment records.
pub trait RecordStore {
    /// Create a record in `pending` state and return it.
    fn create_record(
        &self,
        vps_target_id: &str,
        workflow_id: Option<&str>,
    ) -> DeployResult<DeploymentRecord>;

    /// Apply a partial update to an existing record.
    fn update_record(&self, id: &str, patch: RecordPatch) -> DeployResult<()>;
}

/// Read-only lookup of stored VPS targets, scoped to the calling
/// identity — a target owned by another caller is reported as absent,
/// not as forbidden.
pub trait TargetStore {
    fn get_target(&self, id: &str, caller_id: &str) -> DeployResult<Option<VpsTarget>>;
}
