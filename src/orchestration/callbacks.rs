//! Callback tree bookkeeping.
//!
//! When a root finishes, its ON_HOLD callback children are resolved: the
//! branch that does not match the outcome is deleted, everything else is
//! released to PENDING for the root manager to pick up.

use crate::core::{RootId, RootStatus, RootType, WorkflowRoot};
use crate::error::Result;
use crate::store::Store;
use crate::tlog_debug;

/// Whether a callback of `root_type` survives a parent outcome.
pub fn survives(root_type: RootType, parent_failed: bool) -> bool {
    match root_type {
        RootType::OnSuccess => !parent_failed,
        RootType::OnFailure => parent_failed,
        RootType::OnComplete | RootType::Normal => true,
    }
}

/// Delete the opposite branch and release the rest.
///
/// Only ON_HOLD children are touched, so running this again after a
/// partial commit is a no-op for the part already done.
pub fn resolve(store: &dyn Store, parent: RootId, parent_failed: bool) -> Result<()> {
    for mut callback in store.callback_roots(parent)? {
        if callback.status() != RootStatus::OnHold {
            continue;
        }
        if survives(callback.root_type, parent_failed) {
            callback.transition(RootStatus::Pending)?;
            store.save_root(&mut callback)?;
            tlog_debug!(
                "Released {} callback {} of root {}",
                callback.root_type,
                callback.id.short(),
                parent.short()
            );
        } else {
            // Nested callbacks go with it.
            store.delete_root(callback.id)?;
            tlog_debug!(
                "Deleted {} callback {} of root {}",
                callback.root_type,
                callback.id.short(),
                parent.short()
            );
        }
    }
    Ok(())
}

/// Callback children that keep `parent` in a WFC status.
pub fn holding(store: &dyn Store, parent: RootId) -> Result<Vec<WorkflowRoot>> {
    Ok(store
        .callback_roots(parent)?
        .into_iter()
        .filter(|r| r.hold_parent_status_update && r.status().is_blocking())
        .collect())
}

pub fn holding_count(store: &dyn Store, parent: RootId) -> Result<usize> {
    Ok(holding(store, parent)?.len())
}

/// Hold-parent callbacks that will still block `parent` once `resolve`
/// has run for this outcome. Read only; the deleted branch is left out.
pub fn holding_after(store: &dyn Store, parent: RootId, parent_failed: bool) -> Result<usize> {
    Ok(holding(store, parent)?
        .into_iter()
        .filter(|r| r.status() != RootStatus::OnHold || survives(r.root_type, parent_failed))
        .count())
}
