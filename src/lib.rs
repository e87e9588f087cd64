pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod registry;
pub mod store;
pub mod util;
pub mod view;

pub use error::{Error, Result};
pub use registry::{Action, ActionRegistry, Outcome};
pub use store::{MemoryStore, Store};
