//! Task executor: advances one root's task DAG by one tick.
//!
//! Every tick re-derives its view from the store. The frontier is the set
//! of `in_focus` tasks; it grows lazily as tasks succeed, so a tick only
//! touches the part of the DAG that can move.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::callbacks;
use super::dispatch::{ActionJob, Dispatch};
use super::TickReport;
use crate::core::{EdgeSet, RootId, RootStatus, TaskId, TaskStatus, WorkflowRoot, WorkflowTask};
use crate::error::Result;
use crate::registry::{ActionRegistry, UNREGISTERED_ACTION_MESSAGE};
use crate::store::{Claim, Store};
use crate::{tlog, tlog_debug, tlog_error, tlog_trace, tlog_warn};

pub struct TaskExecutor {
    store: Arc<dyn Store>,
    registry: Arc<ActionRegistry>,
    dispatcher: Arc<dyn Dispatch>,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ActionRegistry>,
        dispatcher: Arc<dyn Dispatch>,
    ) -> Self {
        Self {
            store,
            registry,
            dispatcher,
        }
    }

    /// Run one tick for `root_id`.
    ///
    /// The root's `executor_running` lock is taken up front and released on
    /// every exit path. A root that was deleted or rewritten concurrently
    /// yields `TickReport::Stale` rather than an error.
    pub fn tick(&self, root_id: RootId) -> Result<TickReport> {
        let mut root = match self.store.lock_root(root_id)? {
            Claim::Acquired(root) => root,
            Claim::Busy => {
                tlog_debug!("Root {} is busy, skipping tick", root_id.short());
                return Ok(TickReport::Busy);
            }
            Claim::Missing => return Ok(TickReport::Missing),
        };

        let result = self.advance(&mut root);
        let unlocked = self.store.unlock_root(root_id);

        match result {
            Ok(status) => {
                unlocked?;
                Ok(TickReport::Ticked(status))
            }
            Err(e) if e.is_stale() => {
                tlog_debug!("Root {} tick went stale: {}", root_id.short(), e);
                unlocked?;
                Ok(TickReport::Stale)
            }
            Err(e) => {
                if let Err(unlock_err) = unlocked {
                    tlog_error!("Failed to unlock root {}: {}", root_id.short(), unlock_err);
                }
                Err(e)
            }
        }
    }

    fn advance(&self, root: &mut WorkflowRoot) -> Result<RootStatus> {
        match root.status() {
            RootStatus::Initiated => {
                root.transition(RootStatus::Running)?;
                self.store.save_root(root)?;
                tlog_debug!("Root {} INITIATED -> RUNNING", root.id.short());
                self.start(root)?;
                self.step(root)?;
            }
            RootStatus::Running => self.step(root)?,
            status if status.is_wfc() => self.settle(root)?,
            _ => {}
        }
        Ok(root.status())
    }

    /// Dispatch RUN for every task with no previous tasks.
    fn start(&self, root: &WorkflowRoot) -> Result<()> {
        let edges = self.store.task_edges(root.id)?;
        for mut task in self.store.tasks_for_root(root.id)? {
            if task.status() == TaskStatus::Pending && !edges.has_previous(task.id) {
                self.dispatch_run(&mut task)?;
            }
        }
        Ok(())
    }

    /// Walk the focus frontier, then finalize the root if nothing is running.
    fn step(&self, root: &mut WorkflowRoot) -> Result<()> {
        let edges = self.store.task_edges(root.id)?;
        let mut tasks: HashMap<TaskId, WorkflowTask> = self
            .store
            .tasks_for_root(root.id)?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let mut frontier: Vec<TaskId> = tasks
            .values()
            .filter(|t| t.in_focus)
            .map(|t| t.id)
            .collect();
        frontier.sort();
        tlog_trace!(
            "Root {} frontier: {} of {} task(s) in focus",
            root.id.short(),
            frontier.len(),
            tasks.len()
        );
        let mut seen: HashSet<TaskId> = frontier.iter().copied().collect();
        let mut queue: VecDeque<TaskId> = frontier.into();
        let mut still_running = false;

        while let Some(id) = queue.pop_front() {
            let status = match tasks.get(&id) {
                Some(task) => task.status(),
                None => continue,
            };
            match status {
                TaskStatus::Pending => {
                    if is_ready(id, &edges, &tasks) {
                        if let Some(task) = tasks.get_mut(&id) {
                            still_running |= self.dispatch_run(task)?;
                        }
                    }
                }
                TaskStatus::Initiated | TaskStatus::Running | TaskStatus::RunningWaitInitiated => {
                    still_running = true;
                }
                TaskStatus::RunningWait => {
                    if let Some(task) = tasks.get_mut(&id) {
                        self.dispatch_wait(task)?;
                    }
                    still_running = true;
                }
                TaskStatus::Successful => {
                    // Successors first; the parent leaves the frontier last.
                    for next in edges.next(id) {
                        if !seen.insert(next) {
                            continue;
                        }
                        if let Some(task) = tasks.get_mut(&next) {
                            if !task.in_focus {
                                task.in_focus = true;
                                self.store.save_task(task)?;
                            }
                            queue.push_back(next);
                        }
                    }
                    if let Some(task) = tasks.get_mut(&id) {
                        if task.in_focus {
                            task.in_focus = false;
                            self.store.save_task(task)?;
                        }
                    }
                }
                TaskStatus::Failed => {}
            }
        }

        if !still_running {
            let failed = tasks.values().any(|t| t.status() == TaskStatus::Failed);
            self.finalize(root, failed)?;
        }
        Ok(())
    }

    /// Commit the outcome, then resolve callbacks.
    ///
    /// The root write is the compare-and-swap point: if it goes stale the
    /// callbacks are left ON_HOLD for the next tick to decide.
    fn finalize(&self, root: &mut WorkflowRoot, failed: bool) -> Result<()> {
        let holding = callbacks::holding_after(self.store.as_ref(), root.id, failed)?;

        let target = match (failed, holding > 0) {
            (false, false) => RootStatus::CompletedSuccessfully,
            (false, true) => RootStatus::CompletedSuccessfullyWfc,
            (true, false) => RootStatus::CompletedWithFailure,
            (true, true) => RootStatus::CompletedWithFailureWfc,
        };
        root.transition(target)?;
        self.store.save_root(root)?;
        callbacks::resolve(self.store.as_ref(), root.id, failed)?;
        tlog!(
            "Root {} ({}) finished: {} holding={}",
            root.id.short(),
            root.workflow_name,
            target,
            holding
        );
        Ok(())
    }

    /// Drop the WFC suffix once no hold-parent callback is blocking.
    fn settle(&self, root: &mut WorkflowRoot) -> Result<()> {
        // Finishes a resolve interrupted after the outcome was committed.
        let failed = root.status() == RootStatus::CompletedWithFailureWfc;
        callbacks::resolve(self.store.as_ref(), root.id, failed)?;
        let holding = callbacks::holding_count(self.store.as_ref(), root.id)?;
        if holding > 0 {
            tlog_debug!(
                "Root {} still waiting on {} callback(s)",
                root.id.short(),
                holding
            );
            return Ok(());
        }
        let target = root.status().settled();
        root.transition(target)?;
        self.store.save_root(root)?;
        tlog!("Root {} callbacks settled: {}", root.id.short(), target);
        Ok(())
    }

    /// Commit INITIATED and hand RUN to the dispatcher.
    ///
    /// Returns `false` when the task was failed because nothing is
    /// registered for it.
    fn dispatch_run(&self, task: &mut WorkflowTask) -> Result<bool> {
        task.in_focus = true;
        if !self.registry.contains(&task.resource_type, &task.task_type) {
            task.fail(UNREGISTERED_ACTION_MESSAGE)?;
            self.store.save_task(task)?;
            tlog_warn!(
                "Task {} failed: no action for ({}, {})",
                task.id.short(),
                task.resource_type,
                task.task_type
            );
            return Ok(false);
        }

        task.transition(TaskStatus::Initiated)?;
        self.store.save_task(task)?;
        self.dispatcher.dispatch(ActionJob::run(task.id, task.root_id))?;
        tlog_debug!(
            "Task {} PENDING -> INITIATED, RUN dispatched ({}, {})",
            task.id.short(),
            task.resource_type,
            task.task_type
        );
        Ok(true)
    }

    fn dispatch_wait(&self, task: &mut WorkflowTask) -> Result<()> {
        task.transition(TaskStatus::RunningWaitInitiated)?;
        self.store.save_task(task)?;
        self.dispatcher.dispatch(ActionJob::wait(task.id, task.root_id))?;
        tlog_debug!(
            "Task {} RUNNING_WAIT -> RUNNING_WAIT_INITIATED, WAIT dispatched",
            task.id.short()
        );
        Ok(())
    }
}

/// AND-join over every previous task.
fn is_ready(id: TaskId, edges: &EdgeSet<TaskId>, tasks: &HashMap<TaskId, WorkflowTask>) -> bool {
    edges.previous(id).iter().all(|p| {
        tasks
            .get(p)
            .is_some_and(|t| t.status() == TaskStatus::Successful)
    })
}
