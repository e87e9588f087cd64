//! Job queues between executors, managers and workers.
//!
//! Actions are dispatched fire-and-forget: the executor commits the task's
//! new status and hands an [`ActionJob`] to a [`Dispatch`] implementation
//! without waiting for it. Executor invocations go through an
//! [`ExecutorQueue`] that keeps at most one job per entity queued or running.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::core::{RootId, TaskId, WorkspaceId};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Run,
    Wait,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Run => write!(f, "RUN"),
            ActionKind::Wait => write!(f, "WAIT"),
        }
    }
}

/// One RUN or WAIT call for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionJob {
    pub task_id: TaskId,
    /// Owning root, so a raising action can be traced back for recovery.
    pub root_id: RootId,
    pub kind: ActionKind,
}

impl ActionJob {
    pub fn run(task_id: TaskId, root_id: RootId) -> Self {
        Self {
            task_id,
            root_id,
            kind: ActionKind::Run,
        }
    }

    pub fn wait(task_id: TaskId, root_id: RootId) -> Self {
        Self {
            task_id,
            root_id,
            kind: ActionKind::Wait,
        }
    }
}

/// Fire-and-forget sink for action jobs.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, job: ActionJob) -> Result<()>;
}

/// `Dispatch` over a tokio unbounded channel, drained by the action pump.
#[derive(Clone)]
pub struct QueueDispatcher {
    tx: mpsc::UnboundedSender<ActionJob>,
}

impl QueueDispatcher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ActionJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Dispatch for QueueDispatcher {
    fn dispatch(&self, job: ActionJob) -> Result<()> {
        self.tx.send(job).map_err(|_| Error::QueueClosed)
    }
}

/// One executor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorJob {
    Root(RootId),
    Workspace(WorkspaceId),
}

impl std::fmt::Display for ExecutorJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorJob::Root(id) => write!(f, "root {}", id.short()),
            ExecutorJob::Workspace(id) => write!(f, "workspace {}", id.short()),
        }
    }
}

/// Executor job queue with at-most-one-in-flight per entity id.
///
/// A job stays in flight from `enqueue` until the pump calls `complete`,
/// so a manager scanning again before the previous tick finished does not
/// queue a second invocation.
#[derive(Clone)]
pub struct ExecutorQueue {
    tx: mpsc::UnboundedSender<ExecutorJob>,
    in_flight: Arc<Mutex<HashSet<ExecutorJob>>>,
}

impl ExecutorQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutorJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                in_flight: Arc::new(Mutex::new(HashSet::new())),
            },
            rx,
        )
    }

    fn in_flight_set(&self) -> MutexGuard<'_, HashSet<ExecutorJob>> {
        // The set holds plain ids; a panic elsewhere cannot leave it inconsistent.
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue `job` unless one for the same entity is already in flight.
    ///
    /// Returns `Ok(false)` when the job was deduplicated.
    pub fn enqueue(&self, job: ExecutorJob) -> Result<bool> {
        let mut in_flight = self.in_flight_set();
        if !in_flight.insert(job) {
            return Ok(false);
        }
        if self.tx.send(job).is_err() {
            in_flight.remove(&job);
            return Err(Error::QueueClosed);
        }
        Ok(true)
    }

    pub fn complete(&self, job: &ExecutorJob) {
        self.in_flight_set().remove(job);
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight_set().len()
    }
}
