//! Task DAG traversal within a single root.

use tickflow::core::{RootStatus, TaskStatus};
use tickflow::orchestration::{ActionKind, TickReport};
use tickflow::registry::UNREGISTERED_ACTION_MESSAGE;
use tickflow::{Outcome, Store};

use super::fixtures::Harness;

/// Test: Diamond AND-join
/// Given A->B, A->C, B&C->D where C polls twice before succeeding
/// When the root is cycled tick by tick
/// Then D stays PENDING until the tick after C succeeds
#[test]
fn test_diamond_waits_for_both_branches() {
    let (h, scripted) = Harness::scripted();
    let root = h.root("diamond");
    let a = h.task(root, "A");
    let b = h.task(root, "B");
    let c = h.task(root, "C");
    let d = h.task(root, "D");
    h.link(a, b);
    h.link(a, c);
    h.link(b, d);
    h.link(c, d);
    scripted.script("C", vec![Outcome::wait(), Outcome::wait(), Outcome::success()]);
    h.initiate(root);

    // Tick 1: A starts.
    assert_eq!(h.cycle(root), TickReport::Ticked(RootStatus::Running));
    assert_eq!(h.task_status(a), TaskStatus::Successful);
    assert_eq!(h.task_status(b), TaskStatus::Pending);

    // Tick 2: B and C start; B succeeds, C enters RUNNING_WAIT.
    h.cycle(root);
    assert_eq!(h.task_status(b), TaskStatus::Successful);
    assert_eq!(h.task_status(c), TaskStatus::RunningWait);
    assert_eq!(h.task_status(d), TaskStatus::Pending);

    // Tick 3: first WAIT, C still pending.
    h.cycle(root);
    assert_eq!(h.task_status(c), TaskStatus::RunningWait);
    assert_eq!(h.task_status(d), TaskStatus::Pending);

    // Tick 4: second WAIT, C succeeds.
    h.cycle(root);
    assert_eq!(h.task_status(c), TaskStatus::Successful);
    assert_eq!(h.task_status(d), TaskStatus::Pending);
    assert_eq!(h.dispatcher.count(d, ActionKind::Run), 0);

    // Tick 5: D starts.
    h.tick_root(root);
    assert_eq!(h.task_status(d), TaskStatus::Initiated);
    h.drain();

    // Tick 6: nothing left running.
    assert_eq!(
        h.cycle(root),
        TickReport::Ticked(RootStatus::CompletedSuccessfully)
    );
    assert_eq!(h.dispatcher.count(c, ActionKind::Wait), 2);
    for task in [a, b, c, d] {
        assert_eq!(h.dispatcher.count(task, ActionKind::Run), 1);
    }
}

/// Test: Success aggregation
/// Given a chain of three tasks that all succeed
/// When the root runs to completion
/// Then the root is COMPLETED_SUCCESSFULLY and the frontier is empty
#[test]
fn test_all_successful_completes_root() {
    let (h, _) = Harness::scripted();
    let root = h.root("chain");
    let a = h.task(root, "A");
    let b = h.task(root, "B");
    let c = h.task(root, "C");
    h.link(a, b);
    h.link(b, c);
    h.initiate(root);

    assert_eq!(h.run_root(root, 10), RootStatus::CompletedSuccessfully);
    let tasks = h.store.tasks_for_root(root).unwrap();
    assert!(tasks.iter().all(|t| t.status() == TaskStatus::Successful));
    assert!(tasks.iter().all(|t| !t.in_focus));
    assert_eq!(h.store.require_task(a).unwrap().result["resource_id"], "A");
}

/// Test: Failure aggregation
/// Given A->B plus an independent C, where A fails and C polls once
/// When the root runs to completion
/// Then B never leaves PENDING, C still completes, and the root fails
#[test]
fn test_failure_blocks_dependents_but_not_siblings() {
    let (h, scripted) = Harness::scripted();
    let root = h.root("mixed");
    let a = h.task(root, "A");
    let b = h.task(root, "B");
    let c = h.task(root, "C");
    h.link(a, b);
    scripted.script("A", vec![Outcome::failed("quota exceeded")]);
    scripted.script("C", vec![Outcome::wait(), Outcome::success()]);
    h.initiate(root);

    assert_eq!(h.run_root(root, 10), RootStatus::CompletedWithFailure);
    assert_eq!(h.task_status(a), TaskStatus::Failed);
    assert_eq!(h.task_status(b), TaskStatus::Pending);
    assert_eq!(h.task_status(c), TaskStatus::Successful);
    assert_eq!(
        h.store.require_task(a).unwrap().message.as_deref(),
        Some("quota exceeded")
    );
    assert_eq!(h.dispatcher.count(b, ActionKind::Run), 0);
}

/// Test: Idempotent ticks
/// Given a root whose tasks are in flight
/// When the executor is invoked twice back to back without state changes
/// Then the second call dispatches nothing
#[test]
fn test_back_to_back_ticks_do_not_double_dispatch() {
    let (h, scripted) = Harness::scripted();
    let root = h.root("idempotent");
    let a = h.task(root, "A");
    let b = h.task(root, "B");
    scripted.script("B", vec![Outcome::wait(), Outcome::success()]);
    h.initiate(root);

    h.tick_root(root);
    let after_first = h.dispatcher.history().len();
    assert_eq!(after_first, 2);
    h.tick_root(root);
    assert_eq!(h.dispatcher.history().len(), after_first);

    // Same for WAIT: B goes RUNNING_WAIT, one tick dispatches WAIT, the next does not.
    h.drain();
    assert_eq!(h.task_status(b), TaskStatus::RunningWait);
    h.tick_root(root);
    h.tick_root(root);
    assert_eq!(h.dispatcher.count(b, ActionKind::Wait), 1);
    assert_eq!(h.dispatcher.count(a, ActionKind::Run), 1);
    assert_eq!(h.task_status(b), TaskStatus::RunningWaitInitiated);
}

/// Test: Unregistered action
/// Given a ("Foo", "BAR") task with no registry entry next to a valid sibling
/// When the root runs
/// Then the task fails with the fixed message and the sibling proceeds
#[test]
fn test_unregistered_action_fails_only_that_task() {
    let (h, _) = Harness::scripted();
    let root = h.root("unregistered");
    let foo = h.typed_task(root, "Foo", "BAR", "foo-1");
    let sibling = h.task(root, "A");
    h.initiate(root);

    h.tick_root(root);
    let foo_task = h.store.require_task(foo).unwrap();
    assert_eq!(foo_task.status(), TaskStatus::Failed);
    assert_eq!(foo_task.message.as_deref(), Some(UNREGISTERED_ACTION_MESSAGE));
    assert_eq!(h.task_status(sibling), TaskStatus::Initiated);
    assert_eq!(h.dispatcher.count(foo, ActionKind::Run), 0);

    h.drain();
    assert_eq!(h.task_status(sibling), TaskStatus::Successful);
    assert_eq!(h.run_root(root, 5), RootStatus::CompletedWithFailure);
}

/// Test: Never INITIATED before predecessors succeed
/// Given a fan-in of three predecessors into one task
/// When predecessors complete one per tick
/// Then the join task starts only after the last one
#[test]
fn test_fan_in_requires_every_predecessor() {
    let (h, scripted) = Harness::scripted();
    let root = h.root("fan-in");
    let join = h.task(root, "J");
    let preds: Vec<_> = ["P1", "P2", "P3"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let waits = vec![Outcome::wait(); i];
            let mut outcomes = waits;
            outcomes.push(Outcome::success());
            scripted.script(name, outcomes);
            let id = h.task(root, name);
            h.link(id, join);
            id
        })
        .collect();
    h.initiate(root);

    let mut ticks = 0;
    while h.task_status(preds[2]) != TaskStatus::Successful {
        h.cycle(root);
        assert_eq!(h.task_status(join), TaskStatus::Pending);
        ticks += 1;
        assert!(ticks < 10);
    }
    h.tick_root(root);
    assert_eq!(h.task_status(join), TaskStatus::Initiated);
}
