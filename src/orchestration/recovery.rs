//! Crash recovery and logical cancellation.
//!
//! The runtime wraps every executor and worker invocation with these hooks.
//! A tick that errors or panics forces its entity into a failure status and
//! clears `executor_running`, so no entity stays locked forever.
//!
//! A forced root failure is committed first and its callbacks are resolved
//! afterwards, exactly as for a root that failed on its own: ON_SUCCESS is
//! deleted, ON_FAILURE and ON_COMPLETE are released. A forced root never
//! enters a WFC status, so hold-parent callbacks do not delay it. Tasks that
//! were already dispatched are left alone.

use crate::core::{RootId, RootStatus, TaskId, WorkspaceId};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::{tlog_debug, tlog_error, tlog_warn};

use super::callbacks;
use super::dispatch::ActionJob;

/// Attempts before a forced write racing with live writers gives up.
const FORCE_ATTEMPTS: usize = 3;

/// Retry `attempt` while it loses the compare-and-swap.
fn retry_stale<T>(what: &str, mut attempt: impl FnMut() -> Result<T>) -> Result<T> {
    let mut tries = 1;
    loop {
        match attempt() {
            Err(e @ Error::StaleWrite { .. }) => {
                if tries >= FORCE_ATTEMPTS {
                    return Err(e);
                }
                tlog_warn!("{}: {}, retrying", what, e);
                tries += 1;
            }
            other => return other,
        }
    }
}

/// Force a non-terminal root to COMPLETED_WITH_FAILURE.
///
/// Returns `Ok(false)` when the root is gone or already terminal.
fn force_root_failure(store: &dyn Store, id: RootId) -> Result<bool> {
    retry_stale("force root failure", || {
        let Some(mut root) = store.get_root(id)? else {
            return Ok(false);
        };
        if root.status().is_terminal() {
            return Ok(false);
        }
        let from = root.status();
        root.transition(RootStatus::CompletedWithFailure)?;
        store.save_root(&mut root)?;
        tlog_debug!("Root {} {} -> {} (forced)", id.short(), from, root.status());
        Ok(true)
    })
}

/// Resolve the callbacks of a root whose outcome is committed.
///
/// Safe to repeat: it also finishes a resolve that an earlier tick started
/// but did not complete.
fn resolve_finished(store: &dyn Store, id: RootId) -> Result<()> {
    let Some(root) = store.get_root(id)? else {
        return Ok(());
    };
    let status = root.status();
    if !(status.is_terminal() || status.is_wfc()) {
        return Ok(());
    }
    let failed = matches!(
        status,
        RootStatus::CompletedWithFailure | RootStatus::CompletedWithFailureWfc
    );
    match callbacks::resolve(store, id, failed) {
        Err(e) if e.is_stale() => {
            tlog_debug!("Callbacks of root {} changed while resolving: {}", id.short(), e);
            Ok(())
        }
        other => other,
    }
}

/// Crash-recovery hook for a root tick.
pub fn recover_root(store: &dyn Store, id: RootId, reason: &str) -> Result<bool> {
    let forced = force_root_failure(store, id)?;
    let resolved = resolve_finished(store, id);
    store.unlock_root(id)?;
    resolved?;
    if forced {
        tlog_warn!("Recovered root {}: {}", id.short(), reason);
    }
    Ok(forced)
}

/// Crash-recovery hook for a workspace tick.
pub fn recover_workspace(store: &dyn Store, id: WorkspaceId, reason: &str) -> Result<bool> {
    let forced = retry_stale("force workspace failure", || {
        let Some(mut workspace) = store.get_workspace(id)? else {
            return Ok(false);
        };
        if workspace.status().is_terminal() {
            return Ok(false);
        }
        workspace.transition(RootStatus::OnHoldWithFailure)?;
        store.save_workspace(&mut workspace)?;
        Ok(true)
    })?;
    store.unlock_workspace(id)?;
    if forced {
        tlog_warn!("Recovered workspace {}: {}", id.short(), reason);
    }
    Ok(forced)
}

/// Recovery hook for a RUN/WAIT call that raised: the task records the
/// error and its root is forced to COMPLETED_WITH_FAILURE.
pub fn recover_action(store: &dyn Store, job: &ActionJob, err: &Error) -> Result<()> {
    tlog_error!(
        "{} for task {} raised: {}",
        job.kind,
        job.task_id.short(),
        err
    );
    let message = err.to_string();
    match fail_task(store, job.task_id, &message) {
        Ok(_) => {}
        Err(e) if e.is_stale() => {}
        Err(e) => return Err(e),
    }
    recover_root(store, job.root_id, &message)?;
    Ok(())
}

fn fail_task(store: &dyn Store, id: TaskId, message: &str) -> Result<bool> {
    retry_stale("fail task", || {
        let mut task = store.require_task(id)?;
        if task.is_terminal() {
            return Ok(false);
        }
        task.fail(message)?;
        store.save_task(&mut task)?;
        Ok(true)
    })
}

/// Logically cancel a task: force it to FAILED so nothing downstream of it
/// ever becomes eligible.
///
/// Returns `Ok(false)` if the task was already terminal.
///
/// # Errors
/// Returns `Error::TaskNotFound` if the task does not exist.
pub fn cancel_task(store: &dyn Store, id: TaskId, message: &str) -> Result<bool> {
    let changed = fail_task(store, id, message)?;
    if changed {
        tlog_warn!("Cancelled task {}: {}", id.short(), message);
    }
    Ok(changed)
}

/// Logically cancel a root: force it to COMPLETED_WITH_FAILURE and resolve
/// its callbacks on the failure branch. The lock is left to its holder.
///
/// Returns `Ok(false)` if the root was already terminal.
///
/// # Errors
/// Returns `Error::RootNotFound` if the root does not exist.
pub fn cancel_root(store: &dyn Store, id: RootId) -> Result<bool> {
    store.require_root(id)?;
    let changed = force_root_failure(store, id)?;
    resolve_finished(store, id)?;
    if changed {
        tlog_warn!("Cancelled root {}", id.short());
    }
    Ok(changed)
}
