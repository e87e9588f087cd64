//! Root data model.
//!
//! A `WorkflowRoot` groups a DAG of tasks into one coherent operation. Roots
//! form two independent structures:
//!
//! - a callback tree: ON_SUCCESS / ON_FAILURE / ON_COMPLETE children that
//!   wait in ON_HOLD until the parent reaches a terminal outcome;
//! - a workspace DAG: member roots wait in READY until every previous root
//!   has COMPLETED_SUCCESSFULLY.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::WorkspaceId;
use crate::error::{Error, Result};

entity_id!(
    /// Unique identifier for a root.
    RootId
);

/// Root status in its lifecycle.
///
/// The encoding mixes engine control phase with business outcome and is
/// kept that way for compatibility with existing consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RootStatus {
    /// Eligible for the root manager.
    #[default]
    Pending,
    /// Claimed by a manager; the next executor tick starts it.
    Initiated,
    Running,
    /// Callback root waiting for its parent's outcome.
    OnHold,
    /// Workspace member waiting on its previous roots.
    Ready,
    CompletedSuccessfully,
    CompletedWithFailure,
    /// Succeeded, but a hold-parent callback is still blocking.
    CompletedSuccessfullyWfc,
    /// Failed, but a hold-parent callback is still blocking.
    CompletedWithFailureWfc,
    OnHoldWithSuccess,
    OnHoldWithFailure,
}

impl RootStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootStatus::Pending => "PENDING",
            RootStatus::Initiated => "INITIATED",
            RootStatus::Running => "RUNNING",
            RootStatus::OnHold => "ON_HOLD",
            RootStatus::Ready => "READY",
            RootStatus::CompletedSuccessfully => "COMPLETED_SUCCESSFULLY",
            RootStatus::CompletedWithFailure => "COMPLETED_WITH_FAILURE",
            RootStatus::CompletedSuccessfullyWfc => "COMPLETED_SUCCESSFULLY_WFC",
            RootStatus::CompletedWithFailureWfc => "COMPLETED_WITH_FAILURE_WFC",
            RootStatus::OnHoldWithSuccess => "ON_HOLD_WITH_SUCCESS",
            RootStatus::OnHoldWithFailure => "ON_HOLD_WITH_FAILURE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RootStatus::CompletedSuccessfully
                | RootStatus::CompletedWithFailure
                | RootStatus::OnHoldWithSuccess
                | RootStatus::OnHoldWithFailure
        )
    }

    /// Waiting for callbacks.
    pub fn is_wfc(&self) -> bool {
        matches!(
            self,
            RootStatus::CompletedSuccessfullyWfc | RootStatus::CompletedWithFailureWfc
        )
    }

    /// A hold-parent callback in this status keeps its parent in WFC.
    pub fn is_blocking(&self) -> bool {
        !self.is_terminal()
    }

    /// The non-WFC counterpart of a WFC status.
    pub fn settled(&self) -> RootStatus {
        match self {
            RootStatus::CompletedSuccessfullyWfc => RootStatus::CompletedSuccessfully,
            RootStatus::CompletedWithFailureWfc => RootStatus::CompletedWithFailure,
            other => *other,
        }
    }

    pub fn can_transition(&self, target: RootStatus) -> bool {
        use RootStatus::*;
        if !self.is_terminal() && target == CompletedWithFailure {
            return true;
        }
        matches!(
            (self, target),
            (OnHold, Pending)
                | (Ready, Pending)
                | (Pending, Initiated)
                | (Initiated, Running)
                | (Running, CompletedSuccessfully)
                | (Running, CompletedSuccessfullyWfc)
                | (Running, CompletedWithFailureWfc)
                | (CompletedSuccessfullyWfc, CompletedSuccessfully)
        )
    }
}

impl std::fmt::Display for RootStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a root in its callback tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RootType {
    #[default]
    Normal,
    OnSuccess,
    OnFailure,
    OnComplete,
}

impl std::fmt::Display for RootType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RootType::Normal => write!(f, "NORMAL"),
            RootType::OnSuccess => write!(f, "ON_SUCCESS"),
            RootType::OnFailure => write!(f, "ON_FAILURE"),
            RootType::OnComplete => write!(f, "ON_COMPLETE"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRoot {
    pub id: RootId,
    status: RootStatus,
    pub root_type: RootType,
    pub workflow_name: String,
    pub workflow_nature: String,
    /// Request payload echoed back to the caller.
    #[serde(default)]
    pub fe_request_data: Value,
    /// Exclusive-execution flag; only the store flips it.
    #[serde(default)]
    pub executor_running: bool,
    /// Whether the root is part of its workspace's focus frontier.
    #[serde(default)]
    pub in_focus: bool,
    pub parent_root_id: Option<RootId>,
    /// Keep the parent in a WFC status until this callback stops blocking.
    #[serde(default)]
    pub hold_parent_status_update: bool,
    pub workspace_id: Option<WorkspaceId>,
    pub created_at: DateTime<Utc>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl WorkflowRoot {
    /// Create a standalone PENDING root.
    pub fn new(workflow_name: &str) -> Self {
        Self {
            id: RootId::new(),
            status: RootStatus::Pending,
            root_type: RootType::Normal,
            workflow_name: workflow_name.to_string(),
            workflow_nature: String::new(),
            fe_request_data: Value::Null,
            executor_running: false,
            in_focus: false,
            parent_root_id: None,
            hold_parent_status_update: false,
            workspace_id: None,
            created_at: Utc::now(),
            initiated_at: None,
            started_at: None,
            completed_at: None,
            version: 0,
        }
    }

    /// Create an ON_HOLD callback root attached to `parent`.
    pub fn callback(parent: RootId, root_type: RootType, workflow_name: &str) -> Self {
        let mut root = Self::new(workflow_name);
        root.status = RootStatus::OnHold;
        root.root_type = root_type;
        root.parent_root_id = Some(parent);
        root
    }

    /// Create a READY root belonging to `workspace`.
    pub fn member_of(workspace: WorkspaceId, workflow_name: &str) -> Self {
        let mut root = Self::new(workflow_name);
        root.status = RootStatus::Ready;
        root.workspace_id = Some(workspace);
        root
    }

    pub fn with_nature(mut self, nature: &str) -> Self {
        self.workflow_nature = nature.to_string();
        self
    }

    pub fn with_request_data(mut self, data: Value) -> Self {
        self.fe_request_data = data;
        self
    }

    pub fn holding_parent(mut self) -> Self {
        self.hold_parent_status_update = true;
        self
    }

    pub fn status(&self) -> RootStatus {
        self.status
    }

    pub fn is_callback(&self) -> bool {
        self.root_type != RootType::Normal
    }

    /// Move to `target`, stamping the matching timestamp.
    pub fn transition(&mut self, target: RootStatus) -> Result<()> {
        if !self.status.can_transition(target) {
            return Err(Error::InvalidTransition {
                entity: "root",
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }

        let now = Utc::now();
        match target {
            RootStatus::Initiated => self.initiated_at = Some(now),
            RootStatus::Running => self.started_at = Some(now),
            s if s.is_terminal() || s.is_wfc() => {
                // WFC keeps the first completion time.
                if self.completed_at.is_none() || s.is_wfc() {
                    self.completed_at = Some(now);
                }
            }
            _ => {}
        }
        self.status = target;
        Ok(())
    }
}
