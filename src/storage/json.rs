//! JSON file checkpoint store
//!
//! The document is written to a temporary file in the target directory,
//! synced to disk, then renamed over the target. Rename within one
//! directory is atomic, so the previous checkpoint survives a crash mid-write.

use crate::storage::traits::{CheckpointResult, CheckpointStore};
use crate::storage::Checkpoint;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    path: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        let document = checkpoint.to_json()?;
        let directory = self.directory();
        std::fs::create_dir_all(directory)?;

        let mut temp = NamedTempFile::new_in(directory)?;
        temp.write_all(document.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)?;
        Ok(())
    }

    fn load(&self) -> CheckpointResult<Option<Checkpoint>> {
        let document = match std::fs::read_to_string(&self.path) {
            Ok(document) => document,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Checkpoint::from_json(&document).map(Some)
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
