//! Checkpoint store trait definition.
//!
//! Defines the durable, append-only storage interface for execution
//! checkpoints. The infrastructure layer (waystone-infra) implements this
//! trait with SQLite persistence and an in-process store.

use waystone_types::error::RepositoryError;
use waystone_types::workflow::ExecutionCheckpoint;

/// Repository trait for checkpoint persistence.
///
/// Checkpoints are append-only: a store never mutates a record after it has
/// been written, and `read_all` returns records in write order so that
/// replaying them reconstructs the exact execution history.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint for its workflow id.
    fn write_checkpoint(
        &self,
        checkpoint: &ExecutionCheckpoint,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// The most recently written checkpoint for a workflow id.
    fn read_latest(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionCheckpoint>, RepositoryError>> + Send;

    /// Every checkpoint for a workflow id, in write order.
    fn read_all(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionCheckpoint>, RepositoryError>> + Send;
}
