//! SQLite checkpoint store
//!
//! Each save inserts the checkpoint document as a new row and prunes all but
//! the newest rows inside one transaction.

use crate::storage::schema::{initialize_schema, RETAINED_CHECKPOINTS};
use crate::storage::traits::{CheckpointResult, CheckpointStore};
use crate::storage::Checkpoint;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// SQLite checkpoint backend
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteCheckpointStore {
    /// Opens or creates the checkpoint database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteCheckpointStore)` - Successfully opened/created database
    /// * `Err(CheckpointError)` - Failed to open database
    pub fn new(path: &Path) -> CheckpointResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> CheckpointResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Number of stored checkpoints
    pub fn count(&self) -> CheckpointResult<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        Ok(conn.query_row("SELECT COUNT(*) FROM checkpoints", [], |row| row.get(0))?)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        let document = checkpoint.to_json()?;
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO checkpoints (schema_version, taken_at, start_url, document)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                checkpoint.schema_version,
                checkpoint.taken_at.to_rfc3339(),
                checkpoint.start_url,
                document
            ],
        )?;
        tx.execute(
            "DELETE FROM checkpoints WHERE id NOT IN
             (SELECT id FROM checkpoints ORDER BY id DESC LIMIT ?1)",
            params![RETAINED_CHECKPOINTS],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn load(&self) -> CheckpointResult<Option<Checkpoint>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM checkpoints ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        document.as_deref().map(Checkpoint::from_json).transpose()
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for SqliteCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointStore")
            .field("path", &self.path)
            .finish()
    }
}
