//! Checkpoint store trait and error types

use crate::storage::Checkpoint;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while saving or loading checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to replace checkpoint file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Unsupported checkpoint schema version {0}")]
    UnsupportedVersion(u64),

    #[error("Checkpoint is missing a required field: {0}")]
    Missing(String),

    #[error("Corrupt checkpoint: {0}")]
    Corrupt(String),
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Durable home for checkpoints
///
/// A save either fully replaces the previous checkpoint or leaves it
/// untouched; readers never observe a partial write.
pub trait CheckpointStore: Send + Sync {
    /// Persists a checkpoint, replacing the previous one
    fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()>;

    /// Loads the latest checkpoint
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Checkpoint))` - A checkpoint exists and is usable
    /// * `Ok(None)` - Nothing has been saved yet
    /// * `Err(CheckpointError)` - A checkpoint exists but cannot be used
    fn load(&self) -> CheckpointResult<Option<Checkpoint>>;

    /// Where checkpoints are written, for log messages
    fn location(&self) -> &Path;
}
