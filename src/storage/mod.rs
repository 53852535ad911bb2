//! Storage module for crawl checkpoints
//!
//! This module handles persisting engine state so a crawl can resume after
//! a pause or a process restart:
//! - The versioned `Checkpoint` document (frontier, dedup keys, domain states)
//! - A JSON file store written with temp-file-then-rename
//! - A SQLite store keeping the most recent snapshots

mod json;
mod schema;
mod sqlite;
mod traits;

pub use json::JsonCheckpointStore;
pub use sqlite::SqliteCheckpointStore;
pub use traits::{CheckpointError, CheckpointResult, CheckpointStore};

use crate::config::{CheckpointBackend, CheckpointConfig};
use crate::frontier::{DedupKey, PendingEntry};
use crate::output::ResultsSnapshot;
use crate::state::DomainSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Schema version written by this build
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// A durable snapshot of engine state
///
/// Unknown fields are ignored on load, so later versions can add data
/// without breaking older readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub schema_version: u32,
    pub taken_at: DateTime<Utc>,
    pub start_url: String,
    /// Pending work in pop order, in-flight entries first
    pub frontier_snapshot: Vec<PendingEntry>,
    pub dedup_snapshot: Vec<DedupKey>,
    pub domain_states_snapshot: Vec<DomainSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

impl Checkpoint {
    /// Serializes as pretty-printed JSON
    pub fn to_json(&self) -> CheckpointResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses and version-checks a checkpoint document
    ///
    /// # Returns
    ///
    /// * `Ok(Checkpoint)` - A usable checkpoint (newer versions log a warning)
    /// * `Err(CheckpointError::Missing)` - A required field is absent
    /// * `Err(CheckpointError::UnsupportedVersion)` - Version 0
    /// * `Err(CheckpointError::Json)` - Not valid JSON or a malformed field
    pub fn from_json(document: &str) -> CheckpointResult<Self> {
        let value: serde_json::Value = serde_json::from_str(document)?;
        let version = value
            .get("schemaVersion")
            .ok_or_else(|| CheckpointError::Missing("schemaVersion".to_string()))?
            .as_u64()
            .ok_or_else(|| CheckpointError::Corrupt("schemaVersion is not a number".to_string()))?;

        if version == 0 {
            return Err(CheckpointError::UnsupportedVersion(0));
        }
        if version > u64::from(CHECKPOINT_SCHEMA_VERSION) {
            tracing::warn!(
                "Checkpoint schema version {} is newer than {}; unknown fields are ignored",
                version,
                CHECKPOINT_SCHEMA_VERSION
            );
        }

        serde_json::from_value(value).map_err(|e| {
            let message = e.to_string();
            if message.starts_with("missing field") {
                CheckpointError::Missing(message)
            } else {
                CheckpointError::Json(e)
            }
        })
    }
}

/// Opens the store selected by the checkpoint configuration
pub fn open_store(config: &CheckpointConfig) -> CheckpointResult<Arc<dyn CheckpointStore>> {
    Ok(match config.backend {
        CheckpointBackend::Json => Arc::new(JsonCheckpointStore::new(&config.path)),
        CheckpointBackend::Sqlite => Arc::new(SqliteCheckpointStore::new(&config.path)?),
    })
}
