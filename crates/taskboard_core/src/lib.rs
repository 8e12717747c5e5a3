//! Optimistic CRUD synchronization core for Taskboard.
//! Holds the confirmed record store, optimistic overlays and the command
//! dispatcher that reconciles them with a remote API.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod remote;
pub mod repo;
pub mod schema;
pub mod store;
pub mod sync;

pub use config::{ConfigError, RemoteConfig, SyncConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::about::{About, AboutPatch, ABOUT_COLLECTION};
pub use model::entity::{field_map, Entity, EntityId, FieldMap, FieldValue};
pub use model::task::{NewTask, Task, TaskPatch, TaskPriority, TaskStatus, TASKS_COLLECTION};
pub use remote::http::HttpRemote;
pub use remote::local::{ServerError, SqliteServer};
pub use remote::{
    Operation, RemoteErrorKind, RemoteFailure, RemoteOutcome, RemoteRequest, RemoteSuccess,
    RemoteSyncClient,
};
pub use schema::{EntitySchema, FieldKind, FieldRule, SchemaRegistry, ValidationError};
pub use store::{VisibleEntity, VisibleKey};
pub use sync::{CommandDispatcher, CommandError, CommandId, CommandOutcome, PendingCommand};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
