//! Task data model.
//!
//! A `WorkflowTask` is the atomic unit of work bound to one resource. The
//! engine never executes it directly: RUN and WAIT are dispatched to the
//! action registered for `(resource_type, task_type)` and the reported
//! outcome is folded back through [`WorkflowTask::transition`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RootId;
use crate::error::{Error, Result};

entity_id!(
    /// Unique identifier for a task.
    TaskId
);

/// Task status in its lifecycle.
///
/// ```text
/// PENDING -> INITIATED -> RUNNING -> RUNNING_WAIT <-> RUNNING_WAIT_INITIATED
///                  \          \            \                 \
///                   +----------+------------+-----------------+--> SUCCESSFUL | FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting for every previous task to succeed.
    #[default]
    Pending,
    /// RUN has been dispatched but the action has not picked it up yet.
    Initiated,
    /// The action is executing RUN.
    Running,
    /// The action started asynchronous work and must be polled with WAIT.
    RunningWait,
    /// WAIT has been dispatched.
    RunningWaitInitiated,
    Successful,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Initiated => "INITIATED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::RunningWait => "RUNNING_WAIT",
            TaskStatus::RunningWaitInitiated => "RUNNING_WAIT_INITIATED",
            TaskStatus::Successful => "SUCCESSFUL",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Successful | TaskStatus::Failed)
    }

    /// Check whether `self -> target` is a legal edge.
    ///
    /// Any non-terminal status may be forced to FAILED; that is how
    /// cancellation and crash recovery are expressed.
    pub fn can_transition(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        if !self.is_terminal() && target == Failed {
            return true;
        }
        matches!(
            (self, target),
            (Pending, Initiated)
                | (Initiated, Running)
                | (Initiated, RunningWait)
                | (Initiated, Successful)
                | (Running, RunningWait)
                | (Running, Successful)
                | (RunningWait, RunningWaitInitiated)
                | (RunningWaitInitiated, RunningWait)
                | (RunningWaitInitiated, Successful)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single task in a root's DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: TaskId,
    /// The root that owns this task.
    pub root_id: RootId,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub task_type: String,
    status: TaskStatus,
    /// Free-text status message, set on failure.
    pub message: Option<String>,
    /// Opaque bag passed to and from actions.
    #[serde(default)]
    pub task_metadata: Value,
    /// Opaque result reported by the action.
    #[serde(default)]
    pub result: Value,
    /// Whether the task is part of the root's focus frontier.
    #[serde(default)]
    pub in_focus: bool,
    pub created_at: DateTime<Utc>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version, bumped by the store on every save.
    #[serde(default)]
    pub version: u64,
}

impl WorkflowTask {
    /// Create a PENDING task for `(resource_type, task_type)` owned by `root_id`.
    pub fn new(root_id: RootId, resource_type: &str, task_type: &str) -> Self {
        Self {
            id: TaskId::new(),
            root_id,
            resource_id: None,
            resource_type: resource_type.to_string(),
            task_type: task_type.to_string(),
            status: TaskStatus::Pending,
            message: None,
            task_metadata: Value::Null,
            result: Value::Null,
            in_focus: false,
            created_at: Utc::now(),
            initiated_at: None,
            started_at: None,
            completed_at: None,
            version: 0,
        }
    }

    pub fn with_resource(mut self, resource_id: &str) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.task_metadata = metadata;
        self
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Move to `target`, stamping the matching timestamp.
    ///
    /// This is the only way to change a task's status.
    pub fn transition(&mut self, target: TaskStatus) -> Result<()> {
        if !self.status.can_transition(target) {
            return Err(Error::InvalidTransition {
                entity: "task",
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }

        let now = Utc::now();
        match target {
            TaskStatus::Initiated => self.initiated_at = Some(now),
            TaskStatus::Running => self.started_at = Some(now),
            TaskStatus::Successful | TaskStatus::Failed => self.completed_at = Some(now),
            _ => {}
        }
        self.status = target;
        Ok(())
    }

    /// Force the task to FAILED with a message.
    pub fn fail(&mut self, message: &str) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.message = Some(message.to_string());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
