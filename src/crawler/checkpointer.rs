//! Periodic checkpoint capture

use crate::frontier::Frontier;
use crate::state::DomainRegistry;
use crate::storage::{Checkpoint, CheckpointStore, CHECKPOINT_SCHEMA_VERSION};
use std::sync::Arc;

/// Captures engine state and hands it to a checkpoint store
pub(crate) struct Checkpointer {
    pub store: Arc<dyn CheckpointStore>,
    pub frontier: Arc<Frontier>,
    pub registry: Arc<DomainRegistry>,
    pub start_url: String,
    pub config_hash: Option<String>,
}

impl Checkpointer {
    /// Copies frontier, dedup, results and domain states
    ///
    /// Each structure is copied under its own lock; workers are only held
    /// up for the duration of the copy.
    pub fn capture(&self) -> Checkpoint {
        let frontier = self.frontier.snapshot();
        Checkpoint {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            taken_at: self.registry.clock().wall_now(),
            start_url: self.start_url.clone(),
            frontier_snapshot: frontier.pending,
            dedup_snapshot: frontier.dedup,
            domain_states_snapshot: self.registry.snapshot(),
            results: Some(frontier.results),
            config_hash: self.config_hash.clone(),
        }
    }

    /// Captures and saves a checkpoint; failures are logged and the crawl
    /// carries on with in-memory state
    pub async fn save(&self) -> bool {
        let checkpoint = self.capture();
        let pending = checkpoint.frontier_snapshot.len();
        let store = Arc::clone(&self.store);

        match tokio::task::spawn_blocking(move || store.save(&checkpoint)).await {
            Ok(Ok(())) => {
                tracing::debug!(
                    "Checkpoint written to {} ({} pending)",
                    self.store.location().display(),
                    pending
                );
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "Failed to write checkpoint to {}: {}",
                    self.store.location().display(),
                    e
                );
                false
            }
            Err(e) => {
                tracing::warn!("Checkpoint task failed: {}", e);
                false
            }
        }
    }
}
