use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use dossier_checkpoint::store::CheckpointStore;
use dossier_checkpoint::types::{
    Checkpoint, CheckpointMetadata, CheckpointSource, GraphOutput, SuspendedTask,
};
use dossier_core::config::RunConfig;
use dossier_core::error::{DossierError, GraphError, Result, SuspensionError};

use crate::channel::{Channel, ChannelDef, Retention};
use crate::constants::END;
use crate::edge::ConditionalEdge;
use crate::node::NodeFn;
use crate::suspend::{Prepared, SuspendingNode};

/// A node registered on a graph.
#[derive(Clone)]
pub enum GraphNode {
    Task(NodeFn),
    Suspending(Arc<dyn SuspendingNode>),
}

type Channels = HashMap<String, Box<dyn Channel>>;

/// A compiled state graph ready for execution.
///
/// Created by `StateGraph::compile()`. Execution is a sequential loop:
/// run a node, merge its patch through the channel table, checkpoint, then
/// follow the node's route. The compiled graph does no locking of its own;
/// callers serialize invocations per session (see `GraphRunner`).
pub struct CompiledStateGraph {
    pub(crate) nodes: HashMap<String, GraphNode>,
    pub(crate) adjacency: HashMap<String, String>,
    pub(crate) conditional_edges: HashMap<String, ConditionalEdge>,
    pub(crate) channels: HashMap<String, ChannelDef>,
    pub(crate) entry_point: String,
}

/// Mutable execution state for one invocation.
struct Run<'a> {
    session_id: &'a str,
    config: &'a RunConfig,
    store: &'a dyn CheckpointStore,
    channels: Channels,
    step: usize,
    /// Step of the checkpoint this run last saw in the store.
    stored: Option<usize>,
    executed: usize,
}

impl CompiledStateGraph {
    /// Get the names of all nodes in the graph.
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(|s| s.as_str()).collect()
    }

    /// Get the entry point node name.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Check if a channel exists.
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Whether the named node is a suspending node.
    pub fn is_suspending(&self, name: &str) -> bool {
        matches!(self.nodes.get(name), Some(GraphNode::Suspending(_)))
    }

    fn fresh_channels(&self) -> Channels {
        self.channels
            .iter()
            .map(|(k, def)| (k.clone(), def.spec.instantiate()))
            .collect()
    }

    /// Restore channels from a checkpoint. With `only` set, channels of
    /// other retentions keep their defaults.
    fn restore_channels(
        &self,
        channels: &mut Channels,
        checkpoint: &Checkpoint,
        only: Option<Retention>,
    ) {
        for (key, ch) in channels.iter_mut() {
            let keep = match (only, self.channels.get(key)) {
                (None, _) => true,
                (Some(r), Some(def)) => def.retention == r,
                (Some(_), None) => false,
            };
            if !keep {
                continue;
            }
            if let Some(saved) = checkpoint.channel_values.get(key) {
                ch.restore(saved.clone());
            }
        }
    }

    /// Build a state Value from all channels.
    fn build_state(channels: &Channels) -> Value {
        let mut map = serde_json::Map::new();
        for (key, ch) in channels {
            map.insert(key.clone(), ch.get().clone());
        }
        Value::Object(map)
    }

    /// Merge a partial patch into the channels. Unknown keys are ignored.
    fn update_channels(channels: &mut Channels, patch: &Value) -> Result<()> {
        if let Value::Object(map) = patch {
            for (key, value) in map {
                if let Some(ch) = channels.get_mut(key) {
                    ch.update(vec![value.clone()])?;
                }
            }
        }
        Ok(())
    }

    /// The node to run after `current`, or `None` at END.
    fn next_node(&self, current: &str, state: &Value) -> Result<Option<String>> {
        let target = match self.conditional_edges.get(current) {
            Some(ce) => ce.resolve(state)?,
            None => match self.adjacency.get(current) {
                Some(to) => to.clone(),
                None => return Ok(None),
            },
        };
        Ok((target != END).then_some(target))
    }

    /// Load the persisted state of a session, if any.
    pub async fn get_state(
        &self,
        session_id: &str,
        store: &dyn CheckpointStore,
    ) -> Result<Option<Value>> {
        let Some(checkpoint) = store.get(session_id).await? else {
            return Ok(None);
        };
        let mut channels = self.fresh_channels();
        self.restore_channels(&mut channels, &checkpoint, None);
        Ok(Some(Self::build_state(&channels)))
    }

    /// Run a new turn on a session.
    ///
    /// Session-retained channels are restored from the last checkpoint;
    /// turn-retained channels start from their defaults. `input` is then
    /// merged like any other patch. Fails if the session is suspended.
    pub async fn start_turn(
        &self,
        session_id: &str,
        input: Value,
        config: &RunConfig,
        store: &dyn CheckpointStore,
    ) -> Result<GraphOutput> {
        let previous = store.get(session_id).await?;
        let mut channels = self.fresh_channels();
        let mut step = 0;
        let stored = previous.as_ref().map(|cp| cp.step);

        if let Some(cp) = &previous {
            if let Some(task) = &cp.suspended {
                return Err(SuspensionError::Pending {
                    session_id: session_id.to_string(),
                    stage: task.stage.clone(),
                }
                .into());
            }
            self.restore_channels(&mut channels, cp, Some(Retention::Session));
            step = cp.step + 1;
        }

        Self::update_channels(&mut channels, &input)?;

        let mut run = Run {
            session_id,
            config,
            store,
            channels,
            step,
            stored,
            executed: 0,
        };
        run.persist(CheckpointSource::Input, None, None).await?;

        self.run_from(&mut run, Some(self.entry_point.clone())).await
    }

    /// Resume a suspended session with an externally supplied value.
    ///
    /// The suspending node's `prepare` is replayed on the checkpointed state
    /// and `value` is handed to its `resume` half. The merged patch is
    /// written with the suspension marker cleared, conditional on the
    /// checkpoint being unchanged since it was read; a caller that loses
    /// that race gets `NoPendingSuspension`. Execution then continues along
    /// the node's route.
    pub async fn resume(
        &self,
        session_id: &str,
        value: Value,
        config: &RunConfig,
        store: &dyn CheckpointStore,
    ) -> Result<GraphOutput> {
        let no_pending = || SuspensionError::NoPendingSuspension {
            session_id: session_id.to_string(),
        };
        let checkpoint = store.get(session_id).await?.ok_or_else(no_pending)?;
        let task = checkpoint.suspended.clone().ok_or_else(no_pending)?;

        let node = match self.nodes.get(&task.stage) {
            Some(GraphNode::Suspending(node)) => Arc::clone(node),
            _ => return Err(SuspensionError::UnknownStage(task.stage.clone()).into()),
        };
        node.validate_resume(&value)?;

        let mut channels = self.fresh_channels();
        self.restore_channels(&mut channels, &checkpoint, None);
        let state = Self::build_state(&channels);

        match node.prepare(&state).map_err(|e| node_error(&task.stage, e))? {
            Prepared::Suspend(payload) if payload != task.payload => {
                warn!(
                    session_id,
                    stage = %task.stage,
                    "replayed suspension payload differs from the stored one"
                );
            }
            Prepared::Suspend(_) => {}
            Prepared::Proceed(_) => {
                warn!(
                    session_id,
                    stage = %task.stage,
                    "replayed prepare no longer suspends; resuming anyway"
                );
            }
        }

        let patch = node
            .resume(&state, value, config)
            .instrument(info_span!("stage", stage = %task.stage, resumed = true))
            .await
            .map_err(|e| node_error(&task.stage, e))?;
        Self::update_channels(&mut channels, &patch)?;

        let mut run = Run {
            session_id,
            config,
            store,
            channels,
            step: checkpoint.step + 1,
            stored: Some(checkpoint.step),
            executed: 1,
        };
        match run.persist(CheckpointSource::Resume, Some(&task.stage), None).await {
            Err(DossierError::Graph(GraphError::Conflict { .. })) => {
                warn!(session_id, stage = %task.stage, "suspension already claimed");
                return Err(no_pending().into());
            }
            other => other?,
        }
        debug!(session_id, stage = %task.stage, "suspension cleared");

        let state_after = Self::build_state(&run.channels);
        let next = self.next_node(&task.stage, &state_after)?;
        self.run_from(&mut run, next).await
    }

    async fn run_from(&self, run: &mut Run<'_>, start: Option<String>) -> Result<GraphOutput> {
        let mut current = start;

        while let Some(name) = current {
            if run.executed >= run.config.recursion_limit {
                return Err(GraphError::RecursionLimit {
                    limit: run.config.recursion_limit,
                }
                .into());
            }

            let node = self.nodes.get(&name).ok_or_else(|| {
                GraphError::InvalidGraph(format!("Node '{name}' not found during execution"))
            })?;
            let state = Self::build_state(&run.channels);

            let patch = match node {
                GraphNode::Task(f) => f
                    .invoke(state, run.config)
                    .instrument(info_span!("stage", stage = %name))
                    .await
                    .map_err(|e| node_error(&name, e))?,
                GraphNode::Suspending(s) => {
                    match s.prepare(&state).map_err(|e| node_error(&name, e))? {
                        Prepared::Suspend(payload) => {
                            let task = SuspendedTask {
                                stage: name.clone(),
                                payload: payload.clone(),
                                suspended_at: Utc::now(),
                            };
                            run.step += 1;
                            run.persist(CheckpointSource::Suspend, Some(&name), Some(task))
                                .await?;
                            debug!(session_id = run.session_id, stage = %name, "suspended");
                            return Ok(GraphOutput::Suspended {
                                stage: name,
                                payload,
                                state,
                            });
                        }
                        Prepared::Proceed(patch) => patch,
                    }
                }
            };

            Self::update_channels(&mut run.channels, &patch)?;
            run.step += 1;
            run.executed += 1;
            run.persist(CheckpointSource::Loop, Some(&name), None).await?;

            let state_after = Self::build_state(&run.channels);
            current = self.next_node(&name, &state_after)?;
            debug!(
                session_id = run.session_id,
                from = %name,
                to = current.as_deref().unwrap_or(END),
                "routed"
            );
        }

        Ok(GraphOutput::Complete(Self::build_state(&run.channels)))
    }
}

impl Run<'_> {
    /// Write the current channels as the session's checkpoint, provided no
    /// other writer has touched it since this run last saw it.
    async fn persist(
        &mut self,
        source: CheckpointSource,
        node_name: Option<&str>,
        suspended: Option<SuspendedTask>,
    ) -> Result<()> {
        let channel_values = self
            .channels
            .iter()
            .map(|(k, ch)| (k.clone(), ch.snapshot()))
            .collect();
        let checkpoint = Checkpoint {
            session_id: self.session_id.to_string(),
            step: self.step,
            channel_values,
            suspended,
            metadata: CheckpointMetadata {
                source,
                node_name: node_name.map(str::to_string),
                run_id: self.config.run_id.to_string(),
            },
            updated_at: Utc::now(),
        };
        if !self.store.put_if_step(checkpoint, self.stored).await? {
            return Err(GraphError::Conflict {
                session_id: self.session_id.to_string(),
            }
            .into());
        }
        self.stored = Some(self.step);
        Ok(())
    }
}

fn node_error(node: &str, source: DossierError) -> DossierError {
    GraphError::NodeExecution {
        node: node.to_string(),
        source: Box::new(source),
    }
    .into()
}
