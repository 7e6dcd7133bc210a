// TodoStore - Task and label persistence on SQLite

pub mod bridge;
pub mod config;
pub mod error;
pub mod models;
pub mod store;

// Re-export main types for convenience
pub use bridge::{BridgeError, Command, dispatch};
pub use config::Config;
pub use error::{ErrorCode, Result, StoreError};
pub use models::{Label, NewLabel, NewTask, Priority, Task, TaskPatch};
pub use store::Store;
