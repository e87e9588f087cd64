//! The tokio engine end to end.

use std::time::Duration;

use tickflow::config::Config;
use tickflow::core::{
    RootId, RootStatus, RootType, TaskStatus, WorkflowRoot, WorkflowTask, WorkflowsWorkspace,
    WorkspaceId,
};
use tickflow::orchestration::Engine;
use tickflow::{ActionRegistry, Error, MemoryStore, Outcome, Store};

use super::fixtures::{scripted_registry, Fault, FaultyStore};

fn fast_config() -> Config {
    Config {
        root_manager_interval_ms: 5,
        workspace_manager_interval_ms: 5,
        ..Config::default()
    }
}

/// Poll until `done` holds or the deadline passes.
async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let poll = async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll).await.is_ok()
}

fn status_of(store: &MemoryStore, id: RootId) -> RootStatus {
    store.require_root(id).unwrap().status()
}

fn workspace_status(store: &MemoryStore, id: WorkspaceId) -> RootStatus {
    store.require_workspace(id).unwrap().status()
}

fn add_task(store: &MemoryStore, root: RootId, resource_id: &str) -> tickflow::core::TaskId {
    let task = WorkflowTask::new(root, "Instance", "CREATE").with_resource(resource_id);
    let id = task.id;
    store.insert_task(task).unwrap();
    id
}

/// Test: Full engine run
/// Given a workspace R1 -> R2, where R2 has a hold_parent ON_COMPLETE
/// callback and R1 polls once
/// When the engine runs with millisecond manager intervals
/// Then every root and the workspace complete successfully and nothing
/// is left locked
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_runs_workspace_to_completion() {
    let store = MemoryStore::new();
    let ws = WorkflowsWorkspace::new("network");
    let ws_id = ws.id;
    store.insert_workspace(ws).unwrap();

    let r1 = WorkflowRoot::member_of(ws_id, "vpc");
    let r2 = WorkflowRoot::member_of(ws_id, "subnet");
    let (r1_id, r2_id) = (r1.id, r2.id);
    store.insert_root(r1).unwrap();
    store.insert_root(r2).unwrap();
    store.link_roots(r1_id, r2_id).unwrap();

    let hook = WorkflowRoot::callback(r2_id, RootType::OnComplete, "audit").holding_parent();
    let hook_id = hook.id;
    store.insert_root(hook).unwrap();

    let vpc = add_task(&store, r1_id, "vpc-1");
    let subnet = add_task(&store, r2_id, "subnet-1");
    let audit = add_task(&store, hook_id, "audit-1");

    let (registry, scripted) = scripted_registry();
    scripted.script("vpc-1", vec![Outcome::wait(), Outcome::success()]);

    let handle = Engine::in_memory(store.clone(), registry, fast_config()).spawn();

    let finished = wait_until(|| {
        workspace_status(&store, ws_id) == RootStatus::CompletedSuccessfully
            && status_of(&store, r2_id) == RootStatus::CompletedSuccessfully
    })
    .await;
    handle.shutdown().await.unwrap();
    assert!(finished, "workspace did not finish");

    for id in [r1_id, r2_id, hook_id] {
        let root = store.require_root(id).unwrap();
        assert_eq!(root.status(), RootStatus::CompletedSuccessfully);
        assert!(!root.executor_running);
    }
    for id in [vpc, subnet, audit] {
        assert_eq!(store.require_task(id).unwrap().status(), TaskStatus::Successful);
    }
    assert!(!store.require_workspace(ws_id).unwrap().executor_running);
}

/// Test: Raising and panicking actions under the engine
/// Given one root whose action errors and one whose action panics
/// When the engine runs
/// Then both roots end COMPLETED_WITH_FAILURE and unlocked
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_recovers_from_broken_actions() {
    let store = MemoryStore::new();
    let erroring = WorkflowRoot::new("erroring");
    let panicking = WorkflowRoot::new("panicking");
    let (erroring_id, panicking_id) = (erroring.id, panicking.id);
    store.insert_root(erroring).unwrap();
    store.insert_root(panicking).unwrap();

    let e = WorkflowTask::new(erroring_id, "Instance", "CREATE");
    let p = WorkflowTask::new(panicking_id, "Volume", "CREATE");
    let (e_id, p_id) = (e.id, p.id);
    store.insert_task(e).unwrap();
    store.insert_task(p).unwrap();

    let mut registry = ActionRegistry::new();
    registry.register_fn("Instance", "CREATE", |_| {
        Err(Error::Action("provider returned 500".to_string()))
    });
    registry.register_fn("Volume", "CREATE", |_| -> tickflow::Result<Outcome> {
        panic!("driver crashed")
    });

    let handle = Engine::in_memory(store.clone(), registry, fast_config()).spawn();
    let finished = wait_until(|| {
        [erroring_id, panicking_id]
            .iter()
            .all(|id| status_of(&store, *id) == RootStatus::CompletedWithFailure)
    })
    .await;
    handle.shutdown().await.unwrap();
    assert!(finished, "roots were not recovered");

    for id in [erroring_id, panicking_id] {
        assert!(!store.require_root(id).unwrap().executor_running);
    }
    for id in [e_id, p_id] {
        let task = store.require_task(id).unwrap();
        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(task.message.is_some());
    }
}

/// Test: Root tick that errors or panics under the engine
/// Given two roots whose task edges cannot be read, one with an error and
/// one with a panic inside the store
/// When the engine ticks them
/// Then the crash hook leaves both COMPLETED_WITH_FAILURE and unlocked,
/// and their ON_COMPLETE callbacks are released
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_recovers_from_failing_root_tick() {
    let store = FaultyStore::new(MemoryStore::new());
    let erroring = WorkflowRoot::new("erroring");
    let panicking = WorkflowRoot::new("panicking");
    let (erroring_id, panicking_id) = (erroring.id, panicking.id);
    store.insert_root(erroring).unwrap();
    store.insert_root(panicking).unwrap();
    let hook = WorkflowRoot::callback(erroring_id, RootType::OnComplete, "audit");
    let hook_id = hook.id;
    store.insert_root(hook).unwrap();
    let e = add_task(&store.inner, erroring_id, "A");
    let p = add_task(&store.inner, panicking_id, "B");
    store.inject(Fault::TaskEdgesFail(erroring_id));
    store.inject(Fault::TaskEdgesPanic(panicking_id));

    let (registry, _) = scripted_registry();
    let handle = Engine::new(store.clone(), registry, fast_config()).spawn();
    let finished = wait_until(|| {
        let recovered = [erroring_id, panicking_id].iter().all(|id| {
            let root = store.require_root(*id).unwrap();
            root.status() == RootStatus::CompletedWithFailure && !root.executor_running
        });
        recovered && status_of(&store.inner, hook_id) != RootStatus::OnHold
    })
    .await;
    handle.shutdown().await.unwrap();
    assert!(finished, "crash hook did not run");

    // Neither tick got as far as dispatching.
    for id in [e, p] {
        assert_eq!(store.require_task(id).unwrap().status(), TaskStatus::Pending);
    }
}

/// Test: Workspace tick that errors under the engine
/// Given a workspace whose root edges cannot be read
/// When the engine ticks it
/// Then the crash hook leaves it ON_HOLD_WITH_FAILURE and unlocked
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_recovers_from_failing_workspace_tick() {
    let store = FaultyStore::new(MemoryStore::new());
    let ws = WorkflowsWorkspace::new("network");
    let ws_id = ws.id;
    store.insert_workspace(ws).unwrap();
    let member = WorkflowRoot::member_of(ws_id, "vpc");
    let member_id = member.id;
    store.insert_root(member).unwrap();
    add_task(&store.inner, member_id, "vpc-1");
    store.inject(Fault::RootEdgesFail(ws_id));

    let (registry, _) = scripted_registry();
    let handle = Engine::new(store.clone(), registry, fast_config()).spawn();
    let finished = wait_until(|| {
        let workspace = store.require_workspace(ws_id).unwrap();
        workspace.status() == RootStatus::OnHoldWithFailure && !workspace.executor_running
    })
    .await;
    handle.shutdown().await.unwrap();
    assert!(finished, "crash hook did not run");

    assert_eq!(status_of(&store.inner, member_id), RootStatus::Ready);
}

/// Test: Snapshot survives a restart
/// Given an engine that ran a root and wrote a snapshot on shutdown
/// When the snapshot is loaded into a fresh store
/// Then the finished graph is intact
#[tokio::test]
async fn test_snapshot_restart() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("state").join("graph.json");
    let config = Config {
        state_path: Some(path.display().to_string()),
        snapshot_on_shutdown: true,
        ..fast_config()
    };

    let store = MemoryStore::new();
    let root = WorkflowRoot::new("deploy");
    let root_id = root.id;
    store.insert_root(root).unwrap();
    let task = add_task(&store, root_id, "A");

    let (registry, _) = scripted_registry();
    let handle = Engine::in_memory(store.clone(), registry, config).spawn();
    let finished =
        wait_until(|| status_of(&store, root_id) == RootStatus::CompletedSuccessfully).await;
    handle.shutdown().await.unwrap();
    assert!(finished);

    let restored = MemoryStore::load_snapshot(&path).unwrap();
    assert_eq!(status_of(&restored, root_id), RootStatus::CompletedSuccessfully);
    assert_eq!(
        restored.require_task(task).unwrap().status(),
        TaskStatus::Successful
    );
    assert!(restored.snapshot().unwrap().problems().is_empty());
}
