use async_trait::async_trait;

use dossier_core::error::Result;

use crate::types::Checkpoint;

/// Async storage backend for session checkpoints.
///
/// Implementations must be thread-safe (`Send + Sync`). The engine writes
/// through `put_if_step`, which must be atomic against every other writer of
/// the same backing storage, including other processes.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a checkpoint, replacing any previous checkpoint for its session.
    async fn put(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Store `checkpoint` only if the session's stored checkpoint is still at
    /// `expected_step`, or absent when `expected_step` is `None`.
    ///
    /// Returns `false`, writing nothing, when another writer got there first.
    async fn put_if_step(
        &self,
        checkpoint: Checkpoint,
        expected_step: Option<usize>,
    ) -> Result<bool>;

    /// Retrieve the checkpoint for a session.
    async fn get(&self, session_id: &str) -> Result<Option<Checkpoint>>;

    /// Remove a session's checkpoint. Removing an unknown session is a no-op.
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// List session ids with a stored checkpoint, sorted.
    async fn list_sessions(&self) -> Result<Vec<String>>;
}
