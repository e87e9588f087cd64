//! Observable JSON shape consumed by UIs.
//!
//! Field names are part of the external contract and must not change.

use serde::Serialize;
use serde_json::Value;

use crate::core::{EdgeSet, RootId, RootStatus, TaskId, TaskStatus, WorkflowRoot, WorkflowTask};
use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub status: TaskStatus,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub task_type: String,
    pub task_metadata: Value,
    pub result: Value,
    pub message: Option<String>,
    pub previous_task_ids: Vec<TaskId>,
    pub next_task_ids: Vec<TaskId>,
}

impl TaskView {
    pub fn build(task: &WorkflowTask, edges: &EdgeSet<TaskId>) -> Self {
        Self {
            id: task.id,
            status: task.status(),
            resource_id: task.resource_id.clone(),
            resource_type: task.resource_type.clone(),
            task_type: task.task_type.clone(),
            task_metadata: task.task_metadata.clone(),
            result: task.result.clone(),
            message: task.message.clone(),
            previous_task_ids: edges.previous(task.id),
            next_task_ids: edges.next(task.id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RootView {
    pub id: RootId,
    pub status: RootStatus,
    pub workflow_name: String,
    pub next_root_ids: Vec<RootId>,
    pub previous_root_ids: Vec<RootId>,
    pub associated_tasks: Vec<TaskView>,
}

/// Build the view of one root from the store.
pub fn root_view(store: &dyn Store, id: RootId) -> Result<RootView> {
    let root = store.require_root(id)?;
    build_root_view(store, &root)
}

/// Views of every root, oldest first.
pub fn all_root_views(store: &dyn Store) -> Result<Vec<RootView>> {
    store
        .all_roots()?
        .iter()
        .map(|root| build_root_view(store, root))
        .collect()
}

fn build_root_view(store: &dyn Store, root: &WorkflowRoot) -> Result<RootView> {
    let (next_root_ids, previous_root_ids) = match root.workspace_id {
        Some(ws) => {
            let edges = store.root_edges(ws)?;
            (edges.next(root.id), edges.previous(root.id))
        }
        None => (Vec::new(), Vec::new()),
    };

    let task_edges = store.task_edges(root.id)?;
    let associated_tasks = store
        .tasks_for_root(root.id)?
        .iter()
        .map(|task| TaskView::build(task, &task_edges))
        .collect();

    Ok(RootView {
        id: root.id,
        status: root.status(),
        workflow_name: root.workflow_name.clone(),
        next_root_ids,
        previous_root_ids,
        associated_tasks,
    })
}
