//! Callback trees: branch exclusivity and hold-parent WFC.

use tickflow::core::{RootStatus, RootType, TaskStatus};
use tickflow::orchestration::{ActionKind, TickReport};
use tickflow::{Outcome, Store};

use super::fixtures::Harness;

/// Test: Failure branch exclusivity
/// Given a failing parent with ON_SUCCESS (plus a nested child), ON_FAILURE
/// and ON_COMPLETE callbacks
/// When the managers run the tree to completion
/// Then the ON_SUCCESS subtree is deleted and the other two run
#[test]
fn test_failed_parent_runs_failure_and_complete_callbacks() {
    let (mut h, scripted) = Harness::scripted();
    let parent = h.root("deploy");
    h.task(parent, "A");
    scripted.script("A", vec![Outcome::failed("boom")]);

    let on_success = h.callback(parent, RootType::OnSuccess, false);
    let nested = h.callback(on_success, RootType::OnComplete, false);
    let nested_task = h.task(nested, "N");
    let on_failure = h.callback(parent, RootType::OnFailure, false);
    let rollback = h.task(on_failure, "rollback");
    let on_complete = h.callback(parent, RootType::OnComplete, false);

    h.rounds(8);

    assert_eq!(h.root_status(parent), RootStatus::CompletedWithFailure);
    assert!(!h.exists(on_success));
    assert!(!h.exists(nested));
    assert!(h.store.get_task(nested_task).unwrap().is_none());
    assert_eq!(h.root_status(on_failure), RootStatus::CompletedSuccessfully);
    assert_eq!(h.task_status(rollback), TaskStatus::Successful);
    assert_eq!(h.root_status(on_complete), RootStatus::CompletedSuccessfully);
}

/// Test: Success branch exclusivity
/// Given a succeeding parent with all three callback kinds
/// When the managers run the tree to completion
/// Then ON_FAILURE is deleted and ON_SUCCESS and ON_COMPLETE run
#[test]
fn test_successful_parent_runs_success_and_complete_callbacks() {
    let (mut h, _) = Harness::scripted();
    let parent = h.root("deploy");
    h.task(parent, "A");
    let on_success = h.callback(parent, RootType::OnSuccess, false);
    let notify = h.task(on_success, "notify");
    let on_failure = h.callback(parent, RootType::OnFailure, false);
    let rollback = h.task(on_failure, "rollback");
    let on_complete = h.callback(parent, RootType::OnComplete, false);

    h.rounds(8);

    assert_eq!(h.root_status(parent), RootStatus::CompletedSuccessfully);
    assert!(!h.exists(on_failure));
    assert!(h.store.get_task(rollback).unwrap().is_none());
    assert_eq!(h.root_status(on_success), RootStatus::CompletedSuccessfully);
    assert_eq!(h.task_status(notify), TaskStatus::Successful);
    assert_eq!(h.root_status(on_complete), RootStatus::CompletedSuccessfully);
    assert_eq!(h.dispatcher.count(rollback, ActionKind::Run), 0);
}

/// Test: Callbacks stay on hold while the parent runs
/// Given a parent whose only task polls
/// When the parent is still running
/// Then its callbacks remain ON_HOLD and are never ticked
#[test]
fn test_callbacks_wait_for_parent_outcome() {
    let (mut h, scripted) = Harness::scripted();
    let parent = h.root("deploy");
    h.task(parent, "A");
    scripted.script("A", vec![Outcome::wait(); 20]);
    let on_complete = h.callback(parent, RootType::OnComplete, false);
    let audit = h.task(on_complete, "audit");

    h.rounds(5);

    assert_eq!(h.root_status(parent), RootStatus::Running);
    assert_eq!(h.root_status(on_complete), RootStatus::OnHold);
    assert_eq!(h.dispatcher.count(audit, ActionKind::Run), 0);
}

/// Test: Hold-parent callback
/// Given a succeeding parent with a hold_parent ON_SUCCESS callback that polls
/// When the parent finishes before the callback
/// Then the parent sits in COMPLETED_SUCCESSFULLY_WFC until the callback
/// finishes, and flips to COMPLETED_SUCCESSFULLY on its following tick
#[test]
fn test_hold_parent_keeps_parent_in_wfc() {
    let (h, scripted) = Harness::scripted();
    let parent = h.root("deploy");
    h.task(parent, "A");
    let hook = h.callback(parent, RootType::OnSuccess, true);
    h.task(hook, "X");
    scripted.script("X", vec![Outcome::wait(), Outcome::success()]);

    h.initiate(parent);
    assert_eq!(h.run_root(parent, 5), RootStatus::CompletedSuccessfullyWfc);
    assert_eq!(h.root_status(hook), RootStatus::Pending);

    // Parent ticks while the callback is still pending are no-ops.
    assert_eq!(
        h.tick_root(parent),
        TickReport::Ticked(RootStatus::CompletedSuccessfullyWfc)
    );

    h.initiate(hook);
    h.cycle(hook);
    assert_eq!(
        h.tick_root(parent),
        TickReport::Ticked(RootStatus::CompletedSuccessfullyWfc)
    );

    assert_eq!(h.run_root(hook, 5), RootStatus::CompletedSuccessfully);
    assert_eq!(h.root_status(parent), RootStatus::CompletedSuccessfullyWfc);

    assert_eq!(
        h.tick_root(parent),
        TickReport::Ticked(RootStatus::CompletedSuccessfully)
    );
}

/// Test: A failing hold-parent callback still releases its parent
/// Given a succeeding parent whose hold_parent ON_COMPLETE callback fails
/// When the callback finishes
/// Then the parent settles to COMPLETED_SUCCESSFULLY
#[test]
fn test_failed_hold_callback_settles_parent() {
    let (h, scripted) = Harness::scripted();
    let parent = h.root("deploy");
    h.task(parent, "A");
    let hook = h.callback(parent, RootType::OnComplete, true);
    h.task(hook, "X");
    scripted.script("X", vec![Outcome::failed("hook broke")]);

    h.initiate(parent);
    assert_eq!(h.run_root(parent, 5), RootStatus::CompletedSuccessfullyWfc);
    h.initiate(hook);
    assert_eq!(h.run_root(hook, 5), RootStatus::CompletedWithFailure);

    assert_eq!(
        h.tick_root(parent),
        TickReport::Ticked(RootStatus::CompletedSuccessfully)
    );
}

/// Test: Hold-parent on the failure branch
/// Given a failing parent with a hold_parent ON_FAILURE callback
/// When the managers run the tree
/// Then the parent passes through COMPLETED_WITH_FAILURE_WFC and ends
/// COMPLETED_WITH_FAILURE
#[test]
fn test_hold_parent_on_failure_branch() {
    let (mut h, scripted) = Harness::scripted();
    let parent = h.root("deploy");
    h.task(parent, "A");
    scripted.script("A", vec![Outcome::failed("boom")]);
    let rollback = h.callback(parent, RootType::OnFailure, true);
    h.task(rollback, "undo");

    let mut seen_wfc = false;
    for _ in 0..10 {
        h.round();
        seen_wfc |= h.root_status(parent) == RootStatus::CompletedWithFailureWfc;
    }

    assert!(seen_wfc);
    assert_eq!(h.root_status(parent), RootStatus::CompletedWithFailure);
    assert_eq!(h.root_status(rollback), RootStatus::CompletedSuccessfully);
}
