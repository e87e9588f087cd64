//! Orchestration layer for the workflow engine.
//!
//! Managers originate ticks, executors advance one root or workspace per
//! tick, workers apply action outcomes, and the runtime wires all of them
//! onto tokio with crash recovery around every invocation.

pub mod callbacks;
pub mod dispatch;
pub mod manager;
pub mod recovery;
pub mod root_executor;
pub mod runtime;
pub mod task_executor;
pub mod worker;

pub use dispatch::{ActionJob, ActionKind, Dispatch, ExecutorJob, ExecutorQueue, QueueDispatcher};
pub use manager::{RootManager, ScanReport, WorkspaceManager};
pub use root_executor::RootExecutor;
pub use runtime::{Engine, EngineHandle};
pub use task_executor::TaskExecutor;
pub use worker::{ActionWorker, JobReport};

use crate::core::RootStatus;

/// Result of one executor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    /// The tick ran; carries the entity's status afterwards.
    Ticked(RootStatus),
    /// Another executor holds the entity's lock.
    Busy,
    /// The entity no longer exists.
    Missing,
    /// The entity was deleted or rewritten mid-tick; the next tick re-derives.
    Stale,
}
