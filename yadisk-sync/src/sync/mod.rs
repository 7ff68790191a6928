pub mod decision;
pub mod fingerprint;
pub mod level;
pub mod lister;
pub mod model;
pub mod orchestrator;
pub mod paths;
pub mod result;
pub mod state;
pub mod state_json;
pub mod state_sqlite;

#[cfg(test)]
pub(crate) mod fake_remote;

pub use decision::TieBreak;
pub use level::LevelOptions;
pub use orchestrator::{Orchestrator, OrchestratorOptions, SyncPair};
pub use result::{EntryFailure, FailureKind, ReconciliationResult, SyncStats};
pub use state::StateStore;
pub use state_json::JsonStateStore;
pub use state_sqlite::SqliteStateStore;
