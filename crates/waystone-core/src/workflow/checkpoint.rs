//! Durable checkpoint manager for workflow execution state.
//!
//! Wraps `CheckpointStore` to provide a higher-level API for recording one
//! checkpoint per step attempt group. State, previous output, output and
//! state updates are serialized to JSON text here; the store only ever sees
//! opaque blobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;
use waystone_types::workflow::{
    CANCELLED_STEP_NAME, CheckpointStatus, ExecutionCheckpoint, StateMap,
};

use crate::repository::checkpoint::CheckpointStore;

use super::definition::WorkflowStepResult;

/// Message recorded on the cancellation checkpoint.
pub const CANCELLED_MESSAGE: &str = "Workflow cancelled";

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Manages durable execution checkpoints for workflow runs.
///
/// Generic over `S: CheckpointStore` so it works with any storage backend
/// (SQLite, in-memory, etc.). Every step's checkpoint is persisted before the
/// engine moves on to the next step.
pub struct CheckpointManager<S: CheckpointStore> {
    store: S,
}

impl<S: CheckpointStore> CheckpointManager<S> {
    /// Create a new checkpoint manager backed by the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Build and persist the checkpoint for a finished step group.
    #[allow(clippy::too_many_arguments)]
    pub async fn checkpoint_step(
        &self,
        workflow_id: &str,
        step_number: u32,
        step_name: &str,
        pre_state: &StateMap,
        previous_output: Option<&Value>,
        result: &WorkflowStepResult,
        attempts: u32,
        duration: Duration,
    ) -> Result<ExecutionCheckpoint, CheckpointError> {
        let checkpoint = build_checkpoint(
            workflow_id,
            step_number,
            step_name,
            pre_state,
            previous_output,
            result,
            attempts,
            duration,
        )?;
        self.write(&checkpoint).await?;

        tracing::debug!(
            workflow_id,
            step = step_number,
            status = checkpoint.status.as_str(),
            attempts,
            "checkpointed step"
        );

        Ok(checkpoint)
    }

    /// Persist an already-built checkpoint.
    pub async fn write(&self, checkpoint: &ExecutionCheckpoint) -> Result<(), CheckpointError> {
        self.store
            .write_checkpoint(checkpoint)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Recovery helpers
    // -----------------------------------------------------------------------

    /// The latest checkpoint for a workflow, used to compute the resume cursor.
    pub async fn latest(
        &self,
        workflow_id: &str,
    ) -> Result<Option<ExecutionCheckpoint>, CheckpointError> {
        self.store
            .read_latest(workflow_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Full checkpoint trail for a workflow, in write order.
    pub async fn all(&self, workflow_id: &str) -> Result<Vec<ExecutionCheckpoint>, CheckpointError> {
        self.store
            .read_all(workflow_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }
}

impl<S: CheckpointStore + 'static> CheckpointManager<S> {
    /// Write a checkpoint on a detached task and wait for it.
    ///
    /// Used for the terminal checkpoint of a cancelled run: the write is not
    /// raced against any cancellation token and keeps running even if the
    /// caller's future is dropped.
    pub async fn write_detached(
        self: &Arc<Self>,
        checkpoint: ExecutionCheckpoint,
    ) -> Result<(), CheckpointError> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.write(&checkpoint).await })
            .await
            .map_err(|e| CheckpointError::Repository(format!("checkpoint write task failed: {e}")))?
    }
}

// ---------------------------------------------------------------------------
// Record construction
// ---------------------------------------------------------------------------

/// Build the checkpoint record for a finished step group.
#[allow(clippy::too_many_arguments)]
pub fn build_checkpoint(
    workflow_id: &str,
    step_number: u32,
    step_name: &str,
    pre_state: &StateMap,
    previous_output: Option<&Value>,
    result: &WorkflowStepResult,
    attempts: u32,
    duration: Duration,
) -> Result<ExecutionCheckpoint, CheckpointError> {
    let status = if result.success {
        CheckpointStatus::Completed
    } else {
        CheckpointStatus::Failed
    };

    let output = match &result.output {
        Some(value) => to_json(value)?,
        None => String::new(),
    };
    let state_updates = if result.success {
        to_json(&result.state_updates)?
    } else {
        String::new()
    };

    Ok(ExecutionCheckpoint {
        id: Uuid::now_v7(),
        workflow_id: workflow_id.to_string(),
        step_number,
        step_name: step_name.to_string(),
        status,
        state: to_json(pre_state)?,
        input: to_json(&previous_output)?,
        output,
        state_updates,
        error: if result.success {
            None
        } else {
            result.error.clone()
        },
        attempts,
        duration_ms: duration.as_millis() as u64,
        created_at: Utc::now(),
    })
}

/// Build the synthetic checkpoint written when a run observes cancellation.
///
/// Marked `Failed` at the interrupted step so a later resume retries it from
/// the recorded pre-step state.
pub fn build_cancellation_checkpoint(
    workflow_id: &str,
    step_number: u32,
    state: &StateMap,
    previous_output: Option<&Value>,
    elapsed: Duration,
) -> Result<ExecutionCheckpoint, CheckpointError> {
    let result = WorkflowStepResult::failure(CANCELLED_MESSAGE);
    build_checkpoint(
        workflow_id,
        step_number,
        CANCELLED_STEP_NAME,
        state,
        previous_output,
        &result,
        0,
        elapsed,
    )
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, CheckpointError> {
    serde_json::to_string(value).map_err(|e| CheckpointError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying store operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    /// State or output could not be encoded.
    #[error("checkpoint serialization error: {0}")]
    Serialization(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
