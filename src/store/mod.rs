//! Persistence interface for the workflow graph.
//!
//! The engine reads every entity fresh on each tick and commits each phase
//! before the next one reads it. The store is synchronous; callers that run
//! on the async runtime go through `util::blocking`.

pub mod memory;

pub use memory::{MemoryStore, Snapshot};

use crate::core::{
    EdgeSet, RootId, RootStatus, TaskId, WorkflowRoot, WorkflowTask, WorkflowsWorkspace,
    WorkspaceId,
};
use crate::error::{Error, Result};

/// Outcome of trying to take an entity's `executor_running` lock.
#[derive(Debug, Clone)]
pub enum Claim<T> {
    /// The flag was false and is now true; the returned copy carries the
    /// bumped version.
    Acquired(T),
    /// Another executor holds the entity.
    Busy,
    /// The entity no longer exists.
    Missing,
}

impl<T> Claim<T> {
    pub fn acquired(self) -> Option<T> {
        match self {
            Claim::Acquired(value) => Some(value),
            Claim::Busy | Claim::Missing => None,
        }
    }
}

/// Transactional access to tasks, roots, workspaces and their edges.
///
/// `save_*` is a compare-and-swap on the entity's `version`: the write is
/// rejected with `Error::StaleWrite` if the stored version differs from the
/// caller's copy, otherwise it is committed and the caller's copy gets the
/// bumped version. Saving an entity that is gone returns its NotFound error.
pub trait Store: Send + Sync {
    // Tasks

    fn insert_task(&self, task: WorkflowTask) -> Result<()>;
    fn get_task(&self, id: TaskId) -> Result<Option<WorkflowTask>>;
    /// Tasks owned by `root`, oldest first.
    fn tasks_for_root(&self, root: RootId) -> Result<Vec<WorkflowTask>>;
    fn save_task(&self, task: &mut WorkflowTask) -> Result<()>;
    /// Add `from -> to`. Both tasks must belong to the same root and the
    /// edge must not close a cycle.
    fn link_tasks(&self, from: TaskId, to: TaskId) -> Result<()>;
    fn task_edges(&self, root: RootId) -> Result<EdgeSet<TaskId>>;

    // Roots

    fn insert_root(&self, root: WorkflowRoot) -> Result<()>;
    fn get_root(&self, id: RootId) -> Result<Option<WorkflowRoot>>;
    fn all_roots(&self) -> Result<Vec<WorkflowRoot>>;
    fn save_root(&self, root: &mut WorkflowRoot) -> Result<()>;
    /// Remove the root and its callback descendants, with their tasks and
    /// every edge touching them.
    fn delete_root(&self, id: RootId) -> Result<()>;
    fn roots_with_status(&self, statuses: &[RootStatus]) -> Result<Vec<WorkflowRoot>>;
    /// Direct callback children of `parent`.
    fn callback_roots(&self, parent: RootId) -> Result<Vec<WorkflowRoot>>;
    fn roots_for_workspace(&self, workspace: WorkspaceId) -> Result<Vec<WorkflowRoot>>;
    /// Add `from -> to`. Both roots must belong to the same workspace.
    fn link_roots(&self, from: RootId, to: RootId) -> Result<()>;
    fn root_edges(&self, workspace: WorkspaceId) -> Result<EdgeSet<RootId>>;
    fn lock_root(&self, id: RootId) -> Result<Claim<WorkflowRoot>>;
    /// Clear `executor_running`. Missing roots are ignored.
    fn unlock_root(&self, id: RootId) -> Result<()>;

    // Workspaces

    fn insert_workspace(&self, workspace: WorkflowsWorkspace) -> Result<()>;
    fn get_workspace(&self, id: WorkspaceId) -> Result<Option<WorkflowsWorkspace>>;
    fn save_workspace(&self, workspace: &mut WorkflowsWorkspace) -> Result<()>;
    fn delete_workspace(&self, id: WorkspaceId) -> Result<()>;
    fn workspaces_with_status(&self, statuses: &[RootStatus]) -> Result<Vec<WorkflowsWorkspace>>;
    fn lock_workspace(&self, id: WorkspaceId) -> Result<Claim<WorkflowsWorkspace>>;
    fn unlock_workspace(&self, id: WorkspaceId) -> Result<()>;

    fn require_task(&self, id: TaskId) -> Result<WorkflowTask> {
        self.get_task(id)?.ok_or(Error::TaskNotFound(id))
    }

    fn require_root(&self, id: RootId) -> Result<WorkflowRoot> {
        self.get_root(id)?.ok_or(Error::RootNotFound(id))
    }

    fn require_workspace(&self, id: WorkspaceId) -> Result<WorkflowsWorkspace> {
        self.get_workspace(id)?.ok_or(Error::WorkspaceNotFound(id))
    }
}
