//! Root DAGs inside a workspace.

use tickflow::core::{RootStatus, TaskStatus};
use tickflow::orchestration::ActionKind;
use tickflow::view::root_view;
use tickflow::{Outcome, Store};

use super::fixtures::Harness;

/// Test: Failed predecessor holds the workspace
/// Given a workspace with R1 -> R2 where R1's only task fails
/// When the managers run the workspace
/// Then R2 stays READY and the workspace ends ON_HOLD_WITH_FAILURE
#[test]
fn test_failed_root_blocks_successors() {
    let (mut h, scripted) = Harness::scripted();
    let ws = h.workspace("network");
    let r1 = h.member(ws, "vpc");
    let r2 = h.member(ws, "subnet");
    h.link_roots(r1, r2);
    h.task(r1, "vpc-1");
    let subnet = h.task(r2, "subnet-1");
    scripted.script("vpc-1", vec![Outcome::failed("cidr overlap")]);

    h.rounds(8);

    assert_eq!(h.root_status(r1), RootStatus::CompletedWithFailure);
    assert_eq!(h.root_status(r2), RootStatus::Ready);
    assert_eq!(h.task_status(subnet), TaskStatus::Pending);
    assert_eq!(h.workspace_status(ws), RootStatus::OnHoldWithFailure);
    assert!(!h.store.require_workspace(ws).unwrap().executor_running);
}

/// Test: Successful workspace
/// Given a workspace with R1 -> R2 whose tasks all succeed
/// When the managers run the workspace
/// Then both roots complete in order and the workspace is COMPLETED_SUCCESSFULLY
#[test]
fn test_root_chain_completes_workspace() {
    let (mut h, scripted) = Harness::scripted();
    let ws = h.workspace("network");
    let r1 = h.member(ws, "vpc");
    let r2 = h.member(ws, "subnet");
    h.link_roots(r1, r2);
    let vpc = h.task(r1, "vpc-1");
    let subnet = h.task(r2, "subnet-1");
    scripted.script("vpc-1", vec![Outcome::wait(), Outcome::success()]);

    // R2 must not be released while R1 is still running.
    for _ in 0..3 {
        h.round();
        assert_eq!(h.root_status(r2), RootStatus::Ready);
    }
    h.rounds(10);

    assert_eq!(h.root_status(r1), RootStatus::CompletedSuccessfully);
    assert_eq!(h.root_status(r2), RootStatus::CompletedSuccessfully);
    assert_eq!(h.workspace_status(ws), RootStatus::CompletedSuccessfully);
    assert_eq!(h.dispatcher.count(vpc, ActionKind::Wait), 1);
    assert_eq!(h.dispatcher.count(subnet, ActionKind::Run), 1);

    let workspace = h.store.require_workspace(ws).unwrap();
    assert_eq!(workspace.recently_provisioned_roots[0], r2.to_string());
}

/// Test: Root fan-in
/// Given R1 -> R3 and R2 -> R3 where R2 fails
/// When the managers run the workspace
/// Then R3 is never released even though R1 succeeded
#[test]
fn test_root_fan_in_requires_all_predecessors() {
    let (mut h, scripted) = Harness::scripted();
    let ws = h.workspace("stack");
    let r1 = h.member(ws, "db");
    let r2 = h.member(ws, "cache");
    let r3 = h.member(ws, "app");
    h.link_roots(r1, r3);
    h.link_roots(r2, r3);
    h.task(r1, "db-1");
    h.task(r2, "cache-1");
    h.task(r3, "app-1");
    scripted.script("cache-1", vec![Outcome::failed("no capacity")]);

    h.rounds(10);

    assert_eq!(h.root_status(r1), RootStatus::CompletedSuccessfully);
    assert_eq!(h.root_status(r2), RootStatus::CompletedWithFailure);
    assert_eq!(h.root_status(r3), RootStatus::Ready);
    assert_eq!(h.workspace_status(ws), RootStatus::OnHoldWithFailure);
}

/// Test: Root view of a workspace member
/// Given a finished workspace chain
/// When building the view of the first root
/// Then it lists its successor and its tasks
#[test]
fn test_root_view_reports_edges_and_tasks() {
    let (mut h, _) = Harness::scripted();
    let ws = h.workspace("network");
    let r1 = h.member(ws, "vpc");
    let r2 = h.member(ws, "subnet");
    h.link_roots(r1, r2);
    let vpc = h.task(r1, "vpc-1");
    h.task(r2, "subnet-1");

    h.rounds(12);

    let view = root_view(&*h.store, r1).unwrap();
    assert_eq!(view.status, RootStatus::CompletedSuccessfully);
    assert_eq!(view.next_root_ids, vec![r2]);
    assert!(view.previous_root_ids.is_empty());
    assert_eq!(view.associated_tasks.len(), 1);
    assert_eq!(view.associated_tasks[0].id, vpc);
    assert_eq!(view.associated_tasks[0].status, TaskStatus::Successful);
}
