//! Tokio wiring for the engine.
//!
//! Four long-lived tasks: two manager loops on `tokio::time::interval`, an
//! executor pump and an action pump. Every executor tick and action call
//! runs on the blocking pool through `util::blocking` and is wrapped by the
//! recovery hooks, so an error or panic never leaves an entity locked.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::dispatch::{ActionJob, Dispatch, ExecutorJob, ExecutorQueue, QueueDispatcher};
use super::manager::{RootManager, ScanReport, WorkspaceManager};
use super::recovery;
use super::root_executor::RootExecutor;
use super::task_executor::TaskExecutor;
use super::worker::ActionWorker;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::registry::ActionRegistry;
use crate::store::{MemoryStore, Store};
use crate::util::blocking;
use crate::{tlog, tlog_debug, tlog_error, tlog_trace};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Engine {
    store: Arc<dyn Store>,
    registry: Arc<ActionRegistry>,
    config: Config,
    snapshot_store: Option<MemoryStore>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, registry: ActionRegistry, config: Config) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            config,
            snapshot_store: None,
        }
    }

    /// Engine over a `MemoryStore`. With `snapshot_on_shutdown` and a
    /// `state_path` configured, the graph is written out on shutdown.
    pub fn in_memory(store: MemoryStore, registry: ActionRegistry, config: Config) -> Self {
        Self {
            store: Arc::new(store.clone()),
            registry: Arc::new(registry),
            config,
            snapshot_store: Some(store),
        }
    }

    /// Spawn the engine tasks. Must be called inside a tokio runtime.
    pub fn spawn(self) -> EngineHandle {
        let cancel = CancellationToken::new();
        let drain = CancellationToken::new();

        let (dispatcher, action_rx) = QueueDispatcher::channel();
        let dispatcher: Arc<dyn Dispatch> = Arc::new(dispatcher);
        let (queue, executor_rx) = ExecutorQueue::channel();

        let task_executor = Arc::new(TaskExecutor::new(
            self.store.clone(),
            self.registry.clone(),
            dispatcher,
        ));
        let root_executor = Arc::new(RootExecutor::new(self.store.clone()));
        let worker = Arc::new(ActionWorker::new(self.store.clone(), self.registry.clone()));
        let root_manager = RootManager::new(self.store.clone(), queue.clone());
        let workspace_manager = WorkspaceManager::new(self.store.clone(), queue.clone());

        tlog!(
            "Engine starting: {} action(s), root scan every {:?}, workspace scan every {:?}",
            self.registry.len(),
            self.config.root_manager_interval(),
            self.config.workspace_manager_interval()
        );

        let control = vec![
            tokio::spawn(manager_loop(
                "root manager",
                self.config.root_manager_interval(),
                cancel.clone(),
                move || root_manager.scan(),
            )),
            tokio::spawn(manager_loop(
                "workspace manager",
                self.config.workspace_manager_interval(),
                cancel.clone(),
                move || workspace_manager.scan(),
            )),
            tokio::spawn(executor_pump(
                executor_rx,
                queue.clone(),
                task_executor,
                root_executor,
                self.store.clone(),
                cancel.clone(),
            )),
        ];
        let actions = tokio::spawn(action_pump(action_rx, worker, self.store.clone(), drain.clone()));

        EngineHandle {
            cancel,
            drain,
            control,
            actions,
            queue,
            config: self.config,
            snapshot_store: self.snapshot_store,
        }
    }
}

/// Handle to a running engine, used for graceful shutdown.
pub struct EngineHandle {
    cancel: CancellationToken,
    drain: CancellationToken,
    control: Vec<JoinHandle<()>>,
    actions: JoinHandle<()>,
    queue: ExecutorQueue,
    config: Config,
    snapshot_store: Option<MemoryStore>,
}

impl EngineHandle {
    /// Executor jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.queue.in_flight_count()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_with_timeout(SHUTDOWN_TIMEOUT).await
    }

    /// Stop the managers and executor pump, let running ticks commit, then
    /// drain actions that were already dispatched.
    ///
    /// # Errors
    /// Returns `Error::Timeout` if the tasks do not stop within `timeout`.
    pub async fn shutdown_with_timeout(self, timeout: Duration) -> Result<()> {
        tlog!("Engine shutting down");
        self.cancel.cancel();

        let drain = self.drain.clone();
        let control = self.control;
        let actions = self.actions;
        let stopped = async move {
            for result in join_all(control).await {
                if let Err(e) = result {
                    tlog_error!("Engine task failed: {}", e);
                }
            }
            drain.cancel();
            if let Err(e) = actions.await {
                tlog_error!("Action pump failed: {}", e);
            }
        };
        tokio::time::timeout(timeout, stopped)
            .await
            .map_err(|_| Error::Timeout(timeout))?;

        if self.config.snapshot_on_shutdown {
            if let (Some(store), Some(path)) = (self.snapshot_store, self.config.snapshot_path()) {
                let display = path.display().to_string();
                blocking(move || store.save_snapshot(&path)).await?;
                tlog!("Snapshot written to {}", display);
            }
        }

        tlog!("Engine stopped");
        Ok(())
    }
}

async fn manager_loop<F>(name: &'static str, period: Duration, cancel: CancellationToken, scan: F)
where
    F: Fn() -> Result<ScanReport> + Send + Sync + 'static,
{
    let scan = Arc::new(scan);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tlog_debug!("{} cancelled", name);
                break;
            }
            _ = interval.tick() => {
                let scan = scan.clone();
                match blocking(move || scan()).await {
                    Ok(report) if report.enqueued > 0 => {
                        tlog_debug!("{}: {:?}", name, report);
                    }
                    Ok(_) => {}
                    Err(e) => tlog_error!("{} scan failed: {}", name, e),
                }
            }
        }
    }
}

async fn executor_pump(
    mut rx: mpsc::UnboundedReceiver<ExecutorJob>,
    queue: ExecutorQueue,
    tasks: Arc<TaskExecutor>,
    roots: Arc<RootExecutor>,
    store: Arc<dyn Store>,
    cancel: CancellationToken,
) {
    let mut running = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(_) = running.join_next(), if !running.is_empty() => {}
            job = rx.recv() => {
                let Some(job) = job else { break };
                let queue = queue.clone();
                let tasks = tasks.clone();
                let roots = roots.clone();
                let store = store.clone();
                running.spawn(async move {
                    run_executor_job(job, tasks, roots, store).await;
                    queue.complete(&job);
                });
            }
        }
    }
    while running.join_next().await.is_some() {}
    tlog_debug!("Executor pump stopped");
}

async fn run_executor_job(
    job: ExecutorJob,
    tasks: Arc<TaskExecutor>,
    roots: Arc<RootExecutor>,
    store: Arc<dyn Store>,
) {
    let result = match job {
        ExecutorJob::Root(id) => blocking(move || tasks.tick(id)).await,
        ExecutorJob::Workspace(id) => blocking(move || roots.tick(id)).await,
    };

    match result {
        Ok(report) => tlog_trace!("{} tick: {:?}", job, report),
        Err(e) => {
            tlog_error!("{} tick failed: {}", job, e);
            let reason = e.to_string();
            let recovered = blocking(move || match job {
                ExecutorJob::Root(id) => recovery::recover_root(store.as_ref(), id, &reason),
                ExecutorJob::Workspace(id) => {
                    recovery::recover_workspace(store.as_ref(), id, &reason)
                }
            })
            .await;
            if let Err(e) = recovered {
                tlog_error!("Recovery for {} failed: {}", job, e);
            }
        }
    }
}

/// Runs until `drain` fires, then finishes every job already queued.
async fn action_pump(
    mut rx: mpsc::UnboundedReceiver<ActionJob>,
    worker: Arc<ActionWorker>,
    store: Arc<dyn Store>,
    drain: CancellationToken,
) {
    let mut running = JoinSet::new();
    loop {
        tokio::select! {
            _ = drain.cancelled() => break,
            Some(_) = running.join_next(), if !running.is_empty() => {}
            job = rx.recv() => {
                let Some(job) = job else { break };
                running.spawn(run_action_job(job, worker.clone(), store.clone()));
            }
        }
    }

    rx.close();
    while let Some(job) = rx.recv().await {
        running.spawn(run_action_job(job, worker.clone(), store.clone()));
    }
    while running.join_next().await.is_some() {}
    tlog_debug!("Action pump stopped");
}

async fn run_action_job(job: ActionJob, worker: Arc<ActionWorker>, store: Arc<dyn Store>) {
    match blocking(move || worker.execute(job)).await {
        Ok(report) => tlog_trace!("{} for task {}: {:?}", job.kind, job.task_id.short(), report),
        Err(e) if e.is_stale() => {
            tlog_debug!(
                "{} for task {} superseded: {}",
                job.kind,
                job.task_id.short(),
                e
            );
        }
        Err(e) => {
            let recovered = blocking(move || recovery::recover_action(store.as_ref(), &job, &e)).await;
            if let Err(e) = recovered {
                tlog_error!("Recovery for task {} failed: {}", job.task_id.short(), e);
            }
        }
    }
}
