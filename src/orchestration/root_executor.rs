//! Root executor: advances one workspace's root DAG by one tick.
//!
//! Same shape as the task executor one level up. Member roots wait in
//! READY until every previous root has COMPLETED_SUCCESSFULLY, are then
//! released to PENDING, and from there the root manager drives them.

use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::TickReport;
use crate::core::{EdgeSet, RootId, RootStatus, WorkflowRoot, WorkflowsWorkspace, WorkspaceId};
use crate::error::Result;
use crate::store::{Claim, Store};
use crate::{tlog, tlog_debug, tlog_error, tlog_trace};

pub struct RootExecutor {
    store: Arc<dyn Store>,
}

impl RootExecutor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn tick(&self, workspace_id: WorkspaceId) -> Result<TickReport> {
        let mut workspace = match self.store.lock_workspace(workspace_id)? {
            Claim::Acquired(ws) => ws,
            Claim::Busy => {
                tlog_debug!("Workspace {} is busy, skipping tick", workspace_id.short());
                return Ok(TickReport::Busy);
            }
            Claim::Missing => return Ok(TickReport::Missing),
        };

        let result = self.advance(&mut workspace);
        let unlocked = self.store.unlock_workspace(workspace_id);

        match result {
            Ok(status) => {
                unlocked?;
                Ok(TickReport::Ticked(status))
            }
            Err(e) if e.is_stale() => {
                tlog_debug!("Workspace {} tick went stale: {}", workspace_id.short(), e);
                unlocked?;
                Ok(TickReport::Stale)
            }
            Err(e) => {
                if let Err(unlock_err) = unlocked {
                    tlog_error!(
                        "Failed to unlock workspace {}: {}",
                        workspace_id.short(),
                        unlock_err
                    );
                }
                Err(e)
            }
        }
    }

    fn advance(&self, workspace: &mut WorkflowsWorkspace) -> Result<RootStatus> {
        match workspace.status() {
            RootStatus::Initiated => {
                workspace.transition(RootStatus::Running)?;
                self.store.save_workspace(workspace)?;
                tlog_debug!("Workspace {} INITIATED -> RUNNING", workspace.id.short());
                self.start(workspace)?;
                self.step(workspace)?;
            }
            RootStatus::Running => self.step(workspace)?,
            _ => {}
        }
        Ok(workspace.status())
    }

    /// Release every READY root that has no previous roots.
    fn start(&self, workspace: &mut WorkflowsWorkspace) -> Result<()> {
        let edges = self.store.root_edges(workspace.id)?;
        let mut released = Vec::new();
        for mut root in self.store.roots_for_workspace(workspace.id)? {
            if root.status() == RootStatus::Ready && !edges.has_previous(root.id) {
                self.release(&mut root)?;
                released.push(root.id);
            }
        }
        self.record_released(workspace, &released)
    }

    fn step(&self, workspace: &mut WorkflowsWorkspace) -> Result<()> {
        let edges = self.store.root_edges(workspace.id)?;
        let mut roots: HashMap<RootId, WorkflowRoot> = self
            .store
            .roots_for_workspace(workspace.id)?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        let mut frontier: Vec<RootId> = roots.values().filter(|r| r.in_focus).map(|r| r.id).collect();
        frontier.sort();
        tlog_trace!(
            "Workspace {} frontier: {} of {} root(s) in focus",
            workspace.id.short(),
            frontier.len(),
            roots.len()
        );
        let mut seen: HashSet<RootId> = frontier.iter().copied().collect();
        let mut queue: VecDeque<RootId> = frontier.into();
        let mut still_running = false;
        let mut released = Vec::new();

        while let Some(id) = queue.pop_front() {
            let status = match roots.get(&id) {
                Some(root) => root.status(),
                None => continue,
            };
            match status {
                RootStatus::Ready => {
                    if is_provisionable(id, &edges, &roots) {
                        if let Some(root) = roots.get_mut(&id) {
                            self.release(root)?;
                            released.push(id);
                        }
                        still_running = true;
                    }
                }
                RootStatus::OnHold => {}
                RootStatus::Pending
                | RootStatus::Initiated
                | RootStatus::Running
                | RootStatus::CompletedSuccessfullyWfc
                | RootStatus::CompletedWithFailureWfc => still_running = true,
                RootStatus::CompletedSuccessfully => {
                    // Successors first; the parent leaves the frontier last.
                    for next in edges.next(id) {
                        if !seen.insert(next) {
                            continue;
                        }
                        if let Some(root) = roots.get_mut(&next) {
                            if !root.in_focus {
                                root.in_focus = true;
                                self.store.save_root(root)?;
                            }
                            queue.push_back(next);
                        }
                    }
                    if let Some(root) = roots.get_mut(&id) {
                        if root.in_focus {
                            root.in_focus = false;
                            self.store.save_root(root)?;
                        }
                    }
                }
                RootStatus::CompletedWithFailure
                | RootStatus::OnHoldWithSuccess
                | RootStatus::OnHoldWithFailure => {}
            }
        }

        self.record_released(workspace, &released)?;

        if !still_running {
            self.finalize(workspace, roots.values())?;
        }
        Ok(())
    }

    fn finalize<'a>(
        &self,
        workspace: &mut WorkflowsWorkspace,
        roots: impl Iterator<Item = &'a WorkflowRoot>,
    ) -> Result<()> {
        let mut any_failed = false;
        let mut any_waiting = false;
        for root in roots {
            match root.status() {
                RootStatus::CompletedWithFailure => any_failed = true,
                RootStatus::Ready | RootStatus::OnHold => any_waiting = true,
                _ => {}
            }
        }

        let target = if any_failed {
            RootStatus::OnHoldWithFailure
        } else if any_waiting {
            RootStatus::OnHoldWithSuccess
        } else {
            RootStatus::CompletedSuccessfully
        };
        workspace.transition(target)?;
        self.store.save_workspace(workspace)?;
        tlog!(
            "Workspace {} ({}) finished: {}",
            workspace.id.short(),
            workspace.name,
            target
        );
        Ok(())
    }

    fn release(&self, root: &mut WorkflowRoot) -> Result<()> {
        root.transition(RootStatus::Pending)?;
        root.in_focus = true;
        self.store.save_root(root)?;
        tlog_debug!("Root {} READY -> PENDING", root.id.short());
        Ok(())
    }

    /// Keep the ids released this tick in the workspace's provisioning cache.
    fn record_released(&self, workspace: &mut WorkflowsWorkspace, released: &[RootId]) -> Result<()> {
        if released.is_empty() {
            return Ok(());
        }
        workspace.recently_provisioned_roots =
            Value::Array(released.iter().map(|id| Value::String(id.to_string())).collect());
        self.store.save_workspace(workspace)
    }
}

/// READY and every previous root COMPLETED_SUCCESSFULLY.
pub fn is_provisionable(
    id: RootId,
    edges: &EdgeSet<RootId>,
    roots: &HashMap<RootId, WorkflowRoot>,
) -> bool {
    let ready = roots
        .get(&id)
        .is_some_and(|r| r.status() == RootStatus::Ready);
    ready
        && edges.previous(id).iter().all(|p| {
            roots
                .get(p)
                .is_some_and(|r| r.status() == RootStatus::CompletedSuccessfully)
        })
}
