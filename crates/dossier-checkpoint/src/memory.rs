use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use dossier_core::error::{GraphError, Result};

use crate::store::CheckpointStore;
use crate::types::Checkpoint;

/// Process-local store; sessions vanish with the process.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    sessions: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> GraphError {
    GraphError::Checkpoint("memory store lock poisoned".into())
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        self.sessions
            .write()
            .map_err(|_| poisoned())?
            .insert(checkpoint.session_id.clone(), checkpoint);
        Ok(())
    }

    async fn put_if_step(
        &self,
        checkpoint: Checkpoint,
        expected_step: Option<usize>,
    ) -> Result<bool> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        let current = sessions.get(&checkpoint.session_id).map(|cp| cp.step);
        if current != expected_step {
            return Ok(false);
        }
        sessions.insert(checkpoint.session_id.clone(), checkpoint);
        Ok(true)
    }

    async fn get(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.sessions.read().map_err(|_| poisoned())?.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.write().map_err(|_| poisoned())?.remove(session_id);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .map_err(|_| poisoned())?
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }
}
