//! In-memory `Store` with JSON snapshots.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Claim, Store};
use crate::core::{
    EdgeSet, RootId, RootStatus, TaskId, WorkflowRoot, WorkflowTask, WorkflowsWorkspace,
    WorkspaceId,
};
use crate::error::{Error, Result};
use crate::{tlog_debug, tlog_warn};

const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of the whole graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    #[serde(default)]
    pub tasks: Vec<WorkflowTask>,
    #[serde(default)]
    pub roots: Vec<WorkflowRoot>,
    #[serde(default)]
    pub workspaces: Vec<WorkflowsWorkspace>,
    #[serde(default)]
    pub task_edges: EdgeSet<TaskId>,
    #[serde(default)]
    pub root_edges: EdgeSet<RootId>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            tasks: Vec::new(),
            roots: Vec::new(),
            workspaces: Vec::new(),
            task_edges: EdgeSet::new(),
            root_edges: EdgeSet::new(),
        }
    }
}

impl Snapshot {
    pub fn read(path: &Path) -> Result<Self> {
        tlog_debug!("Snapshot::read path={}", path.display());
        let contents = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;
        tlog_debug!(
            "Snapshot loaded: {} tasks, {} roots, {} workspaces",
            snapshot.tasks.len(),
            snapshot.roots.len(),
            snapshot.workspaces.len()
        );
        Ok(snapshot)
    }

    /// Write through a temp file and rename so a crash never leaves a torn snapshot.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)?;
        fs::rename(&temp_path, path)?;
        tlog_debug!("Snapshot saved: {}", path.display());
        Ok(())
    }

    /// Structural problems that would make the graph unsafe to execute.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut task_roots: HashMap<TaskId, RootId> = HashMap::new();
        for task in &self.tasks {
            if task_roots.insert(task.id, task.root_id).is_some() {
                problems.push(format!("duplicate task {}", task.id));
            }
        }
        let mut root_workspaces: HashMap<RootId, Option<WorkspaceId>> = HashMap::new();
        for root in &self.roots {
            if root_workspaces.insert(root.id, root.workspace_id).is_some() {
                problems.push(format!("duplicate root {}", root.id));
            }
        }
        let workspaces: HashSet<WorkspaceId> = self.workspaces.iter().map(|w| w.id).collect();

        for task in &self.tasks {
            if !root_workspaces.contains_key(&task.root_id) {
                problems.push(format!("task {} belongs to missing root {}", task.id, task.root_id));
            }
        }
        for root in &self.roots {
            if let Some(parent) = root.parent_root_id {
                if !root_workspaces.contains_key(&parent) {
                    problems.push(format!("root {} has missing parent {}", root.id, parent));
                }
            }
            if let Some(ws) = root.workspace_id {
                if !workspaces.contains(&ws) {
                    problems.push(format!("root {} belongs to missing workspace {}", root.id, ws));
                }
            }
        }

        for (from, to) in self.task_edges.edges() {
            match (task_roots.get(&from), task_roots.get(&to)) {
                (Some(a), Some(b)) if a == b => {}
                (Some(_), Some(_)) => {
                    problems.push(format!("task edge {} -> {} crosses roots", from, to))
                }
                _ => problems.push(format!("task edge {} -> {} has a missing endpoint", from, to)),
            }
        }
        for (from, to) in self.root_edges.edges() {
            match (root_workspaces.get(&from), root_workspaces.get(&to)) {
                (Some(Some(a)), Some(Some(b))) if a == b => {}
                (Some(_), Some(_)) => problems.push(format!(
                    "root edge {} -> {} is not between members of one workspace",
                    from, to
                )),
                _ => problems.push(format!("root edge {} -> {} has a missing endpoint", from, to)),
            }
        }

        if self.task_edges.is_cyclic() {
            problems.push("task edges contain a cycle".to_string());
        }
        if self.root_edges.is_cyclic() {
            problems.push("root edges contain a cycle".to_string());
        }

        problems
    }
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, WorkflowTask>,
    roots: HashMap<RootId, WorkflowRoot>,
    workspaces: HashMap<WorkspaceId, WorkflowsWorkspace>,
    task_edges: EdgeSet<TaskId>,
    root_edges: EdgeSet<RootId>,
}

impl Inner {
    /// Remove `id` and its callback descendants, each with its tasks and
    /// edges.
    fn remove_root(&mut self, id: RootId) {
        let mut stack = vec![id];
        while let Some(root) = stack.pop() {
            stack.extend(
                self.roots
                    .values()
                    .filter(|r| r.parent_root_id == Some(root))
                    .map(|r| r.id),
            );
            self.remove_single_root(root);
        }
    }

    fn remove_single_root(&mut self, id: RootId) {
        let task_ids: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.root_id == id)
            .map(|t| t.id)
            .collect();
        for task_id in task_ids {
            self.tasks.remove(&task_id);
            self.task_edges.remove_node(task_id);
        }
        self.root_edges.remove_node(id);
        self.roots.remove(&id);
    }
}

fn stale(entity: &'static str, id: impl ToString) -> Error {
    Error::StaleWrite {
        entity,
        id: id.to_string(),
    }
}

fn sorted_roots(mut roots: Vec<WorkflowRoot>) -> Vec<WorkflowRoot> {
    roots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    roots
}

/// Mutex-guarded store. Clones share the same graph.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| Error::StorePoisoned)
    }

    /// Build a store from a snapshot.
    ///
    /// No executor survives a restart, so persisted `executor_running`
    /// flags are cleared.
    ///
    /// # Errors
    /// Returns `Error::Validation` listing every structural problem found.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let problems = snapshot.problems();
        if !problems.is_empty() {
            return Err(Error::Validation(problems.join("; ")));
        }

        let mut inner = Inner {
            task_edges: snapshot.task_edges,
            root_edges: snapshot.root_edges,
            ..Inner::default()
        };
        for task in snapshot.tasks {
            inner.tasks.insert(task.id, task);
        }
        for mut root in snapshot.roots {
            if root.executor_running {
                tlog_warn!("Clearing stale executor lock on root {}", root.id);
                root.executor_running = false;
            }
            inner.roots.insert(root.id, root);
        }
        for mut workspace in snapshot.workspaces {
            if workspace.executor_running {
                tlog_warn!("Clearing stale executor lock on workspace {}", workspace.id);
                workspace.executor_running = false;
            }
            inner.workspaces.insert(workspace.id, workspace);
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let inner = self.lock()?;
        let mut tasks: Vec<WorkflowTask> = inner.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let roots = sorted_roots(inner.roots.values().cloned().collect());
        let mut workspaces: Vec<WorkflowsWorkspace> = inner.workspaces.values().cloned().collect();
        workspaces.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(Snapshot {
            version: SNAPSHOT_VERSION,
            tasks,
            roots,
            workspaces,
            task_edges: inner.task_edges.clone(),
            root_edges: inner.root_edges.clone(),
        })
    }

    pub fn load_snapshot(path: &Path) -> Result<Self> {
        Self::from_snapshot(Snapshot::read(path)?)
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        self.snapshot()?.write(path)
    }
}

impl Store for MemoryStore {
    fn insert_task(&self, task: WorkflowTask) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.roots.contains_key(&task.root_id) {
            return Err(Error::RootNotFound(task.root_id));
        }
        if inner.tasks.contains_key(&task.id) {
            return Err(Error::Validation(format!("task {} already exists", task.id)));
        }
        inner.tasks.insert(task.id, task);
        Ok(())
    }

    fn get_task(&self, id: TaskId) -> Result<Option<WorkflowTask>> {
        Ok(self.lock()?.tasks.get(&id).cloned())
    }

    fn tasks_for_root(&self, root: RootId) -> Result<Vec<WorkflowTask>> {
        let inner = self.lock()?;
        let mut tasks: Vec<WorkflowTask> = inner
            .tasks
            .values()
            .filter(|t| t.root_id == root)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    fn save_task(&self, task: &mut WorkflowTask) -> Result<()> {
        let mut inner = self.lock()?;
        let stored = inner
            .tasks
            .get_mut(&task.id)
            .ok_or(Error::TaskNotFound(task.id))?;
        if stored.version != task.version {
            return Err(stale("task", task.id));
        }
        task.version += 1;
        *stored = task.clone();
        Ok(())
    }

    fn link_tasks(&self, from: TaskId, to: TaskId) -> Result<()> {
        let mut inner = self.lock()?;
        let from_root = inner.tasks.get(&from).ok_or(Error::TaskNotFound(from))?.root_id;
        let to_root = inner.tasks.get(&to).ok_or(Error::TaskNotFound(to))?.root_id;
        if from_root != to_root {
            return Err(Error::Validation(format!(
                "tasks {} and {} belong to different roots",
                from, to
            )));
        }
        inner.task_edges.insert(from, to)?;
        Ok(())
    }

    fn task_edges(&self, root: RootId) -> Result<EdgeSet<TaskId>> {
        let inner = self.lock()?;
        let ids: HashSet<TaskId> = inner
            .tasks
            .values()
            .filter(|t| t.root_id == root)
            .map(|t| t.id)
            .collect();
        Ok(inner.task_edges.restrict(&ids))
    }

    fn insert_root(&self, root: WorkflowRoot) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(parent) = root.parent_root_id {
            if !inner.roots.contains_key(&parent) {
                return Err(Error::RootNotFound(parent));
            }
        }
        if let Some(ws) = root.workspace_id {
            if !inner.workspaces.contains_key(&ws) {
                return Err(Error::WorkspaceNotFound(ws));
            }
        }
        if inner.roots.contains_key(&root.id) {
            return Err(Error::Validation(format!("root {} already exists", root.id)));
        }
        inner.roots.insert(root.id, root);
        Ok(())
    }

    fn get_root(&self, id: RootId) -> Result<Option<WorkflowRoot>> {
        Ok(self.lock()?.roots.get(&id).cloned())
    }

    fn all_roots(&self) -> Result<Vec<WorkflowRoot>> {
        Ok(sorted_roots(self.lock()?.roots.values().cloned().collect()))
    }

    fn save_root(&self, root: &mut WorkflowRoot) -> Result<()> {
        let mut inner = self.lock()?;
        let stored = inner
            .roots
            .get_mut(&root.id)
            .ok_or(Error::RootNotFound(root.id))?;
        if stored.version != root.version {
            return Err(stale("root", root.id));
        }
        root.version += 1;
        *stored = root.clone();
        Ok(())
    }

    fn delete_root(&self, id: RootId) -> Result<()> {
        self.lock()?.remove_root(id);
        Ok(())
    }

    fn roots_with_status(&self, statuses: &[RootStatus]) -> Result<Vec<WorkflowRoot>> {
        let inner = self.lock()?;
        Ok(sorted_roots(
            inner
                .roots
                .values()
                .filter(|r| statuses.contains(&r.status()))
                .cloned()
                .collect(),
        ))
    }

    fn callback_roots(&self, parent: RootId) -> Result<Vec<WorkflowRoot>> {
        let inner = self.lock()?;
        Ok(sorted_roots(
            inner
                .roots
                .values()
                .filter(|r| r.parent_root_id == Some(parent))
                .cloned()
                .collect(),
        ))
    }

    fn roots_for_workspace(&self, workspace: WorkspaceId) -> Result<Vec<WorkflowRoot>> {
        let inner = self.lock()?;
        Ok(sorted_roots(
            inner
                .roots
                .values()
                .filter(|r| r.workspace_id == Some(workspace))
                .cloned()
                .collect(),
        ))
    }

    fn link_roots(&self, from: RootId, to: RootId) -> Result<()> {
        let mut inner = self.lock()?;
        let from_ws = inner.roots.get(&from).ok_or(Error::RootNotFound(from))?.workspace_id;
        let to_ws = inner.roots.get(&to).ok_or(Error::RootNotFound(to))?.workspace_id;
        match (from_ws, to_ws) {
            (Some(a), Some(b)) if a == b => {}
            _ => {
                return Err(Error::Validation(format!(
                    "roots {} and {} are not members of the same workspace",
                    from, to
                )))
            }
        }
        inner.root_edges.insert(from, to)?;
        Ok(())
    }

    fn root_edges(&self, workspace: WorkspaceId) -> Result<EdgeSet<RootId>> {
        let inner = self.lock()?;
        let ids: HashSet<RootId> = inner
            .roots
            .values()
            .filter(|r| r.workspace_id == Some(workspace))
            .map(|r| r.id)
            .collect();
        Ok(inner.root_edges.restrict(&ids))
    }

    fn lock_root(&self, id: RootId) -> Result<Claim<WorkflowRoot>> {
        let mut inner = self.lock()?;
        match inner.roots.get_mut(&id) {
            None => Ok(Claim::Missing),
            Some(root) if root.executor_running => Ok(Claim::Busy),
            Some(root) => {
                root.executor_running = true;
                root.version += 1;
                Ok(Claim::Acquired(root.clone()))
            }
        }
    }

    fn unlock_root(&self, id: RootId) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(root) = inner.roots.get_mut(&id) {
            if root.executor_running {
                root.executor_running = false;
                root.version += 1;
            }
        }
        Ok(())
    }

    fn insert_workspace(&self, workspace: WorkflowsWorkspace) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.workspaces.contains_key(&workspace.id) {
            return Err(Error::Validation(format!(
                "workspace {} already exists",
                workspace.id
            )));
        }
        inner.workspaces.insert(workspace.id, workspace);
        Ok(())
    }

    fn get_workspace(&self, id: WorkspaceId) -> Result<Option<WorkflowsWorkspace>> {
        Ok(self.lock()?.workspaces.get(&id).cloned())
    }

    fn save_workspace(&self, workspace: &mut WorkflowsWorkspace) -> Result<()> {
        let mut inner = self.lock()?;
        let stored = inner
            .workspaces
            .get_mut(&workspace.id)
            .ok_or(Error::WorkspaceNotFound(workspace.id))?;
        if stored.version != workspace.version {
            return Err(stale("workspace", workspace.id));
        }
        workspace.version += 1;
        *stored = workspace.clone();
        Ok(())
    }

    /// Member roots go with the workspace.
    fn delete_workspace(&self, id: WorkspaceId) -> Result<()> {
        let mut inner = self.lock()?;
        let members: Vec<RootId> = inner
            .roots
            .values()
            .filter(|r| r.workspace_id == Some(id))
            .map(|r| r.id)
            .collect();
        for root in members {
            inner.remove_root(root);
        }
        inner.workspaces.remove(&id);
        Ok(())
    }

    fn workspaces_with_status(&self, statuses: &[RootStatus]) -> Result<Vec<WorkflowsWorkspace>> {
        let inner = self.lock()?;
        let mut out: Vec<WorkflowsWorkspace> = inner
            .workspaces
            .values()
            .filter(|w| statuses.contains(&w.status()))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    fn lock_workspace(&self, id: WorkspaceId) -> Result<Claim<WorkflowsWorkspace>> {
        let mut inner = self.lock()?;
        match inner.workspaces.get_mut(&id) {
            None => Ok(Claim::Missing),
            Some(ws) if ws.executor_running => Ok(Claim::Busy),
            Some(ws) => {
                ws.executor_running = true;
                ws.version += 1;
                Ok(Claim::Acquired(ws.clone()))
            }
        }
    }

    fn unlock_workspace(&self, id: WorkspaceId) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(ws) = inner.workspaces.get_mut(&id) {
            if ws.executor_running {
                ws.executor_running = false;
                ws.version += 1;
            }
        }
        Ok(())
    }
}
