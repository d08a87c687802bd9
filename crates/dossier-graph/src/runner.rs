use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use dossier_checkpoint::store::CheckpointStore;
use dossier_checkpoint::types::{GraphOutput, SuspendedTask};
use dossier_core::config::RunConfig;
use dossier_core::error::Result;

use crate::compiled::CompiledStateGraph;
use crate::session::SessionLocks;

/// Executes a compiled graph against a checkpoint store.
///
/// Every call takes the session's lock for its whole duration, so a
/// session's load, run and persist form one atomic read-modify-write while
/// other sessions proceed in parallel. Runners in other processes sharing
/// the same store are fenced by the store's conditional writes instead.
pub struct GraphRunner {
    graph: Arc<CompiledStateGraph>,
    store: Arc<dyn CheckpointStore>,
    locks: SessionLocks,
    timeout: Option<Duration>,
    recursion_limit: usize,
}

impl GraphRunner {
    pub fn new(graph: CompiledStateGraph, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            graph: Arc::new(graph),
            store,
            locks: SessionLocks::new(),
            timeout: None,
            recursion_limit: RunConfig::default().recursion_limit,
        }
    }

    /// Wall-clock deadline applied to each invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn graph(&self) -> &CompiledStateGraph {
        &self.graph
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    fn run_config(&self, session_id: &str) -> RunConfig {
        let config = RunConfig::new()
            .with_session_id(session_id)
            .with_recursion_limit(self.recursion_limit)
            .with_run_id(Uuid::new_v4());
        match self.timeout {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        }
    }

    /// Start a new turn on `session_id` with `input` merged into the state.
    pub async fn start_turn(&self, session_id: &str, input: Value) -> Result<GraphOutput> {
        let _guard = self.locks.acquire(session_id).await;
        let config = self.run_config(session_id);
        let span = info_span!("turn", session_id, run_id = %config.run_id);

        let output = self
            .graph
            .start_turn(session_id, input, &config, self.store.as_ref())
            .instrument(span.clone())
            .await?;
        info!(parent: &span, suspended = output.is_suspended(), "turn finished");
        Ok(output)
    }

    /// Resume the pending suspension of `session_id` with `value`.
    pub async fn resume(&self, session_id: &str, value: Value) -> Result<GraphOutput> {
        let _guard = self.locks.acquire(session_id).await;
        let config = self.run_config(session_id);
        let span = info_span!("resume", session_id, run_id = %config.run_id);

        let output = self
            .graph
            .resume(session_id, value, &config, self.store.as_ref())
            .instrument(span.clone())
            .await?;
        info!(parent: &span, suspended = output.is_suspended(), "resume finished");
        Ok(output)
    }

    /// The latest persisted state of a session.
    pub async fn snapshot(&self, session_id: &str) -> Result<Option<Value>> {
        let _guard = self.locks.acquire(session_id).await;
        self.graph.get_state(session_id, self.store.as_ref()).await
    }

    /// The suspension a session is parked at, if any.
    pub async fn pending(&self, session_id: &str) -> Result<Option<SuspendedTask>> {
        let _guard = self.locks.acquire(session_id).await;
        Ok(self
            .store
            .get(session_id)
            .await?
            .and_then(|cp| cp.suspended))
    }

    /// Forget everything stored for a session.
    pub async fn reset_session(&self, session_id: &str) -> Result<()> {
        let _guard = self.locks.acquire(session_id).await;
        self.store.delete(session_id).await?;
        info!(session_id, "session reset");
        Ok(())
    }
}
