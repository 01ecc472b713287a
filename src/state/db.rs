// SQLite experiment ledger setup and migrations
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::storage::StorageError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type DbResult<T> = Result<T, DbError>;

// Thread-safe connection shared between sweep workers
#[derive(Clone)]
pub struct DbConnection {
    conn: Arc<Mutex<Connection>>,
}

impl DbConnection {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Lock the connection, recovering from a poisoned mutex
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Open (or create) the ledger at `db_path` and bring its schema up to date
pub fn init_db(db_path: &Path) -> DbResult<DbConnection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    run_migrations(&conn)?;

    log::debug!("Opened experiment ledger at {}", db_path.display());
    Ok(DbConnection::new(conn))
}

/// In-memory ledger, used by tests and dry runs
pub fn open_in_memory() -> DbResult<DbConnection> {
    let conn = Connection::open_in_memory()?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    run_migrations(&conn)?;
    Ok(DbConnection::new(conn))
}

fn run_migrations(conn: &Connection) -> DbResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version < 1 {
        migration_v1(conn)?;
        conn.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [1])?;
    }

    if current_version < 2 {
        migration_v2(conn)?;
        conn.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [2])?;
    }

    Ok(())
}

fn migration_v1(conn: &Connection) -> DbResult<()> {
    // One row per (combination key, test group); metrics only ever increase
    conn.execute(
        "CREATE TABLE IF NOT EXISTS experiments (
            id TEXT PRIMARY KEY,
            key TEXT NOT NULL,
            test_group TEXT NOT NULL,
            model TEXT NOT NULL,
            segment_window INTEGER NOT NULL,
            segment_gap INTEGER NOT NULL,
            smoothing_window INTEGER NOT NULL,
            accuracy REAL NOT NULL,
            smoothed_accuracy REAL NOT NULL,
            top_k_accuracy REAL NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (key, test_group)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_experiments_smoothed ON experiments(smoothed_accuracy DESC)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS artifacts (
            id TEXT PRIMARY KEY,
            experiment_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            path TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            bytes INTEGER NOT NULL,
            FOREIGN KEY (experiment_id) REFERENCES experiments(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_artifacts_experiment_id ON artifacts(experiment_id)",
        [],
    )?;

    Ok(())
}

/// One artifact row per experiment and kind; reruns replace the row
fn migration_v2(conn: &Connection) -> DbResult<()> {
    conn.execute(
        "DELETE FROM artifacts WHERE rowid NOT IN (
            SELECT MAX(rowid) FROM artifacts GROUP BY experiment_id, kind
        )",
        [],
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_artifacts_experiment_kind
         ON artifacts(experiment_id, kind)",
        [],
    )?;

    Ok(())
}
