// State management module
// SQLite experiment ledger and artifact storage

pub mod db;
pub mod models;
pub mod queries;
pub mod storage;

pub use db::{init_db, open_in_memory, DbConnection, DbError, DbResult};
pub use models::{Artifact, ArtifactKind, ExperimentParams, ExperimentResult};
pub use queries::{create_artifact, get_result, list_artifacts, list_results, upsert_result};
pub use storage::{calculate_sha256, default_ledger_path, file_digest, store_file, StorageError};
