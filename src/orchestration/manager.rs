//! Root and workspace managers.
//!
//! A manager scan is the only place new ticks originate: it finds eligible
//! entities that are not executing, claims PENDING ones by flipping them to
//! INITIATED, and enqueues exactly one executor job per entity.

use std::sync::Arc;

use super::dispatch::{ExecutorJob, ExecutorQueue};
use crate::core::RootStatus;
use crate::error::Result;
use crate::store::Store;
use crate::{tlog_debug, tlog_trace};

/// Root statuses a root manager scan picks up. INITIATED is included so a
/// root claimed just before a crash still gets its first tick.
pub const ROOT_SCAN_STATUSES: [RootStatus; 5] = [
    RootStatus::Pending,
    RootStatus::Initiated,
    RootStatus::Running,
    RootStatus::CompletedSuccessfullyWfc,
    RootStatus::CompletedWithFailureWfc,
];

pub const WORKSPACE_SCAN_STATUSES: [RootStatus; 3] = [
    RootStatus::Pending,
    RootStatus::Initiated,
    RootStatus::Running,
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Jobs newly queued.
    pub enqueued: usize,
    /// PENDING entities flipped to INITIATED.
    pub initiated: usize,
    /// Entities skipped because they were executing, already queued, or
    /// changed underneath the scan.
    pub skipped: usize,
}

pub struct RootManager {
    store: Arc<dyn Store>,
    queue: ExecutorQueue,
}

impl RootManager {
    pub fn new(store: Arc<dyn Store>, queue: ExecutorQueue) -> Self {
        Self { store, queue }
    }

    pub fn scan(&self) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        for mut root in self.store.roots_with_status(&ROOT_SCAN_STATUSES)? {
            if root.executor_running {
                report.skipped += 1;
                continue;
            }
            if root.status() == RootStatus::Pending {
                root.transition(RootStatus::Initiated)?;
                match self.store.save_root(&mut root) {
                    Ok(()) => {
                        report.initiated += 1;
                        tlog_debug!("Root {} PENDING -> INITIATED", root.id.short());
                    }
                    Err(e) if e.is_stale() => {
                        report.skipped += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            if self.queue.enqueue(ExecutorJob::Root(root.id))? {
                report.enqueued += 1;
            } else {
                report.skipped += 1;
            }
        }
        tlog_trace!("Root manager scan: {:?}", report);
        Ok(report)
    }
}

pub struct WorkspaceManager {
    store: Arc<dyn Store>,
    queue: ExecutorQueue,
}

impl WorkspaceManager {
    pub fn new(store: Arc<dyn Store>, queue: ExecutorQueue) -> Self {
        Self { store, queue }
    }

    pub fn scan(&self) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        for mut workspace in self.store.workspaces_with_status(&WORKSPACE_SCAN_STATUSES)? {
            if workspace.executor_running {
                report.skipped += 1;
                continue;
            }
            if workspace.status() == RootStatus::Pending {
                workspace.transition(RootStatus::Initiated)?;
                match self.store.save_workspace(&mut workspace) {
                    Ok(()) => {
                        report.initiated += 1;
                        tlog_debug!("Workspace {} PENDING -> INITIATED", workspace.id.short());
                    }
                    Err(e) if e.is_stale() => {
                        report.skipped += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            if self.queue.enqueue(ExecutorJob::Workspace(workspace.id))? {
                report.enqueued += 1;
            } else {
                report.skipped += 1;
            }
        }
        tlog_trace!("Workspace manager scan: {:?}", report);
        Ok(report)
    }
}
