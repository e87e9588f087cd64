//! Workspace data model.
//!
//! A workspace is a DAG of roots forming a multi-resource plan. It reuses
//! the root status encoding but only walks a subset of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RootStatus;
use crate::error::{Error, Result};

entity_id!(
    /// Unique identifier for a workspace.
    WorkspaceId
);

/// Workspace statuses mirror root statuses.
pub type WorkspaceStatus = RootStatus;

fn can_transition(from: WorkspaceStatus, to: WorkspaceStatus) -> bool {
    use RootStatus::*;
    if !from.is_terminal() && to == OnHoldWithFailure {
        return true;
    }
    matches!(
        (from, to),
        (Pending, Initiated)
            | (Initiated, Running)
            | (Running, CompletedSuccessfully)
            | (Running, OnHoldWithSuccess)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowsWorkspace {
    pub id: WorkspaceId,
    pub name: String,
    status: WorkspaceStatus,
    #[serde(default)]
    pub executor_running: bool,
    /// Opaque cache maintained by the owning application.
    #[serde(default)]
    pub recently_provisioned_roots: Value,
    pub created_at: DateTime<Utc>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl WorkflowsWorkspace {
    pub fn new(name: &str) -> Self {
        Self {
            id: WorkspaceId::new(),
            name: name.to_string(),
            status: RootStatus::Pending,
            executor_running: false,
            recently_provisioned_roots: Value::Null,
            created_at: Utc::now(),
            initiated_at: None,
            started_at: None,
            completed_at: None,
            version: 0,
        }
    }

    pub fn status(&self) -> WorkspaceStatus {
        self.status
    }

    pub fn transition(&mut self, target: WorkspaceStatus) -> Result<()> {
        if !can_transition(self.status, target) {
            return Err(Error::InvalidTransition {
                entity: "workspace",
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }

        let now = Utc::now();
        match target {
            RootStatus::Initiated => self.initiated_at = Some(now),
            RootStatus::Running => self.started_at = Some(now),
            s if s.is_terminal() => self.completed_at = Some(now),
            _ => {}
        }
        self.status = target;
        Ok(())
    }
}
