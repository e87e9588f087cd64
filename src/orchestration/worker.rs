//! Action worker: executes one RUN or WAIT job and folds the outcome back
//! into the task.

use std::sync::Arc;

use super::dispatch::{ActionJob, ActionKind};
use crate::core::{TaskStatus, WorkflowTask};
use crate::error::Result;
use crate::registry::{ActionRegistry, Outcome, UNREGISTERED_ACTION_MESSAGE};
use crate::store::Store;
use crate::{tlog_debug, tlog_warn};

/// What happened to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobReport {
    /// The outcome was applied; carries the task's new status.
    Applied(TaskStatus),
    /// The task is gone or no longer expects this job.
    Skipped,
}

pub struct ActionWorker {
    store: Arc<dyn Store>,
    registry: Arc<ActionRegistry>,
}

impl ActionWorker {
    pub fn new(store: Arc<dyn Store>, registry: Arc<ActionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Execute `job` against a freshly loaded task.
    ///
    /// Duplicate or late jobs are skipped. An `Err` means the action itself
    /// raised (or the store failed); the caller hands it to recovery.
    pub fn execute(&self, job: ActionJob) -> Result<JobReport> {
        let Some(mut task) = self.store.get_task(job.task_id)? else {
            tlog_debug!("{} for missing task {} skipped", job.kind, job.task_id.short());
            return Ok(JobReport::Skipped);
        };

        let expected = match job.kind {
            ActionKind::Run => TaskStatus::Initiated,
            ActionKind::Wait => TaskStatus::RunningWaitInitiated,
        };
        if task.status() != expected {
            tlog_debug!(
                "{} for task {} skipped: status is {}",
                job.kind,
                task.id.short(),
                task.status()
            );
            return Ok(JobReport::Skipped);
        }

        let action = match self.registry.lookup_for(&task) {
            Ok(action) => action,
            Err(_) => {
                task.fail(UNREGISTERED_ACTION_MESSAGE)?;
                self.store.save_task(&mut task)?;
                tlog_warn!(
                    "Task {} failed: no action for ({}, {})",
                    task.id.short(),
                    task.resource_type,
                    task.task_type
                );
                return Ok(JobReport::Applied(TaskStatus::Failed));
            }
        };

        let outcome = match job.kind {
            ActionKind::Run => {
                task.transition(TaskStatus::Running)?;
                self.store.save_task(&mut task)?;
                action.run(&task)?
            }
            ActionKind::Wait => action.wait(&task)?,
        };

        // The action may take arbitrarily long; re-read so a cancellation
        // that landed meanwhile is not overwritten.
        let mut task = self.store.require_task(job.task_id)?;
        if task.is_terminal() {
            tlog_debug!(
                "Task {} became {} while its action ran; outcome dropped",
                task.id.short(),
                task.status()
            );
            return Ok(JobReport::Skipped);
        }
        apply(&mut task, outcome)?;
        self.store.save_task(&mut task)?;
        tlog_debug!("Task {} {} -> {}", task.id.short(), job.kind, task.status());
        Ok(JobReport::Applied(task.status()))
    }
}

/// Fold an action outcome into the task.
pub fn apply(task: &mut WorkflowTask, outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Successful { result } => {
            task.transition(TaskStatus::Successful)?;
            task.result = result;
        }
        Outcome::Failed { message } => {
            task.fail(&message)?;
        }
        Outcome::Wait { task_metadata } => {
            task.transition(TaskStatus::RunningWait)?;
            if let Some(metadata) = task_metadata {
                task.task_metadata = metadata;
            }
        }
    }
    Ok(())
}
