//! In-memory checkpoint store.
//!
//! Keeps each workflow's checkpoints in a `Vec` under a `DashMap` entry.
//! Nothing survives the process; use it for benchmark runs that only need
//! the engine's in-process behaviour.

use dashmap::DashMap;
use waystone_core::repository::checkpoint::CheckpointStore;
use waystone_types::error::RepositoryError;
use waystone_types::workflow::ExecutionCheckpoint;

/// Process-local `CheckpointStore`.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: DashMap<String, Vec<ExecutionCheckpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    async fn write_checkpoint(&self, checkpoint: &ExecutionCheckpoint) -> Result<(), RepositoryError> {
        self.checkpoints
            .entry(checkpoint.workflow_id.clone())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn read_latest(
        &self,
        workflow_id: &str,
    ) -> Result<Option<ExecutionCheckpoint>, RepositoryError> {
        Ok(self
            .checkpoints
            .get(workflow_id)
            .and_then(|trail| trail.last().cloned()))
    }

    async fn read_all(&self, workflow_id: &str) -> Result<Vec<ExecutionCheckpoint>, RepositoryError> {
        Ok(self
            .checkpoints
            .get(workflow_id)
            .map(|trail| trail.value().clone())
            .unwrap_or_default())
    }
}
