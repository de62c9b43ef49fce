//! In-process checkpoint stores for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use waystone_types::error::RepositoryError;
use waystone_types::workflow::ExecutionCheckpoint;

use crate::repository::checkpoint::CheckpointStore;

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<HashMap<String, Vec<ExecutionCheckpoint>>>,
}

impl CheckpointStore for MemStore {
    async fn write_checkpoint(&self, checkpoint: &ExecutionCheckpoint) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().map_err(|e| RepositoryError::Query(e.to_string()))?;
        inner
            .entry(checkpoint.workflow_id.clone())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn read_latest(
        &self,
        workflow_id: &str,
    ) -> Result<Option<ExecutionCheckpoint>, RepositoryError> {
        let inner = self.inner.lock().map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(inner.get(workflow_id).and_then(|v| v.last().cloned()))
    }

    async fn read_all(&self, workflow_id: &str) -> Result<Vec<ExecutionCheckpoint>, RepositoryError> {
        let inner = self.inner.lock().map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(inner.get(workflow_id).cloned().unwrap_or_default())
    }
}

/// Store whose writes always fail.
pub struct BrokenStore;

impl CheckpointStore for BrokenStore {
    async fn write_checkpoint(&self, _checkpoint: &ExecutionCheckpoint) -> Result<(), RepositoryError> {
        Err(RepositoryError::Connection)
    }

    async fn read_latest(
        &self,
        _workflow_id: &str,
    ) -> Result<Option<ExecutionCheckpoint>, RepositoryError> {
        Ok(None)
    }

    async fn read_all(&self, _workflow_id: &str) -> Result<Vec<ExecutionCheckpoint>, RepositoryError> {
        Ok(Vec::new())
    }
}
