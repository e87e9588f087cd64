//! Typed action registry.
//!
//! Provider-specific work lives outside the engine. Each `(resource_type,
//! task_type)` pair is bound at startup to an [`Action`] whose RUN and WAIT
//! entry points report an [`Outcome`]; the engine folds that outcome back
//! into the task's status.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::WorkflowTask;
use crate::error::{Error, Result};

/// Message stored on a task whose `(resource_type, task_type)` has no action.
pub const UNREGISTERED_ACTION_MESSAGE: &str =
    "Internal error: no action registered for this resource type and task type";

const NO_WAIT_MESSAGE: &str = "Internal error: no WAIT registered for this action";

/// What an action reports back for one RUN or WAIT call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Successful { result: Value },
    Failed { message: String },
    /// Started asynchronous work; poll again with WAIT. `task_metadata`
    /// replaces the task's bag when present.
    Wait { task_metadata: Option<Value> },
}

impl Outcome {
    pub fn success() -> Self {
        Outcome::Successful { result: Value::Null }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Outcome::Failed {
            message: message.into(),
        }
    }

    pub fn wait() -> Self {
        Outcome::Wait { task_metadata: None }
    }
}

/// RUN and WAIT entry points for one `(resource_type, task_type)`.
///
/// Returning `Err` means the callable itself raised; the runtime hands that
/// to the crash-recovery hook. A business failure should be reported as
/// `Outcome::Failed` instead.
pub trait Action: Send + Sync {
    fn run(&self, task: &WorkflowTask) -> Result<Outcome>;

    fn wait(&self, _task: &WorkflowTask) -> Result<Outcome> {
        Ok(Outcome::failed(NO_WAIT_MESSAGE))
    }
}

/// Adapter so plain closures can be registered.
struct FnAction<R, W> {
    run: R,
    wait: Option<W>,
}

impl<R, W> Action for FnAction<R, W>
where
    R: Fn(&WorkflowTask) -> Result<Outcome> + Send + Sync,
    W: Fn(&WorkflowTask) -> Result<Outcome> + Send + Sync,
{
    fn run(&self, task: &WorkflowTask) -> Result<Outcome> {
        (self.run)(task)
    }

    fn wait(&self, task: &WorkflowTask) -> Result<Outcome> {
        match &self.wait {
            Some(wait) => wait(task),
            None => Ok(Outcome::failed(NO_WAIT_MESSAGE)),
        }
    }
}

type ActionFn = fn(&WorkflowTask) -> Result<Outcome>;

#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<(String, String), Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `action` to `(resource_type, task_type)`, replacing any previous binding.
    pub fn register(&mut self, resource_type: &str, task_type: &str, action: Arc<dyn Action>) {
        self.actions
            .insert((resource_type.to_string(), task_type.to_string()), action);
    }

    /// Bind a RUN closure with no WAIT.
    pub fn register_fn<R>(&mut self, resource_type: &str, task_type: &str, run: R)
    where
        R: Fn(&WorkflowTask) -> Result<Outcome> + Send + Sync + 'static,
    {
        let action: FnAction<R, ActionFn> = FnAction { run, wait: None };
        self.register(resource_type, task_type, Arc::new(action));
    }

    /// Bind RUN and WAIT closures.
    pub fn register_fns<R, W>(&mut self, resource_type: &str, task_type: &str, run: R, wait: W)
    where
        R: Fn(&WorkflowTask) -> Result<Outcome> + Send + Sync + 'static,
        W: Fn(&WorkflowTask) -> Result<Outcome> + Send + Sync + 'static,
    {
        let action = FnAction {
            run,
            wait: Some(wait),
        };
        self.register(resource_type, task_type, Arc::new(action));
    }

    /// # Errors
    /// Returns `Error::UnregisteredAction` when nothing is bound to the pair.
    pub fn lookup(&self, resource_type: &str, task_type: &str) -> Result<Arc<dyn Action>> {
        self.actions
            .get(&(resource_type.to_string(), task_type.to_string()))
            .cloned()
            .ok_or_else(|| Error::UnregisteredAction {
                resource_type: resource_type.to_string(),
                task_type: task_type.to_string(),
            })
    }

    pub fn lookup_for(&self, task: &WorkflowTask) -> Result<Arc<dyn Action>> {
        self.lookup(&task.resource_type, &task.task_type)
    }

    pub fn contains(&self, resource_type: &str, task_type: &str) -> bool {
        self.actions
            .contains_key(&(resource_type.to_string(), task_type.to_string()))
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self
            .actions
            .keys()
            .map(|(r, t)| format!("{}/{}", r, t))
            .collect();
        keys.sort();
        f.debug_struct("ActionRegistry").field("actions", &keys).finish()
    }
}
