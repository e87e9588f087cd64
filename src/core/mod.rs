//! Core domain models for the workflow engine.
//!
//! Tasks, roots and workspaces are plain data with a single status mutator
//! each (`transition`). DAG edges are not stored on the entities; they live
//! in an explicit edge relation (`graph::EdgeSet`) owned by the store.

/// Declares a UUID-backed identifier newtype with a short display form.
/// Defined ahead of the submodules so they can invoke it.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return first 8 characters of the UUID for display.
            pub fn short(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

pub mod graph;
pub mod root;
pub mod task;
pub mod workspace;

pub use graph::EdgeSet;
pub use root::{RootId, RootStatus, RootType, WorkflowRoot};
pub use task::{TaskId, TaskStatus, WorkflowTask};
pub use workspace::{WorkflowsWorkspace, WorkspaceId};
