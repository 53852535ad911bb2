//! Database schema for the SQLite checkpoint store

/// SQL schema for the checkpoint database
pub const SCHEMA_SQL: &str = r#"
-- One row per saved checkpoint; the highest id is the latest
CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    schema_version INTEGER NOT NULL,
    taken_at TEXT NOT NULL,
    start_url TEXT NOT NULL,
    document TEXT NOT NULL
);
"#;

/// Number of checkpoints kept; older rows are pruned on save
pub const RETAINED_CHECKPOINTS: i64 = 5;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
