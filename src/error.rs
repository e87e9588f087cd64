use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(crate::core::TaskId),

    #[error("Root not found: {0}")]
    RootNotFound(crate::core::RootId),

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(crate::core::WorkspaceId),

    #[error("Stale write to {entity} {id}: version changed underneath")]
    StaleWrite { entity: &'static str, id: String },

    #[error("Cycle detected: {0}")]
    CycleDetected(String),

    #[error("No action registered for ({resource_type}, {task_type})")]
    UnregisteredAction {
        resource_type: String,
        task_type: String,
    },

    #[error("Action error: {0}")]
    Action(String),

    #[error("Dispatch queue closed")]
    QueueClosed,

    #[error("Store lock poisoned")]
    StorePoisoned,
}

impl Error {
    /// The entity was deleted or rewritten concurrently; callers treat this as a no-op.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            Error::TaskNotFound(_)
                | Error::RootNotFound(_)
                | Error::WorkspaceNotFound(_)
                | Error::StaleWrite { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
