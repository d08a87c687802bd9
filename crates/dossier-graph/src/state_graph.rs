use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use dossier_core::error::{GraphError, Result};
use serde_json::Value;

use crate::channel::{ChannelDef, ChannelSpec, Retention};
use crate::compiled::{CompiledStateGraph, GraphNode};
use crate::constants::{END, START};
use crate::edge::{ConditionalEdge, Edge};
use crate::guard::{guarded, CURRENT_STAGE_KEY, ERROR_CONTEXT_KEY};
use crate::node::NodeFn;
use crate::suspend::SuspendingNode;

/// Builder for constructing a state graph.
///
/// Register the reducer table with the `add_*_channel` methods, then define
/// the topology with `add_node`, `add_edge` and `add_conditional_edges`, and
/// call `compile()` to validate and produce a `CompiledStateGraph`.
pub struct StateGraph {
    channels: HashMap<String, ChannelDef>,
    nodes: HashMap<String, GraphNode>,
    guarded_nodes: Vec<String>,
    edges: Vec<Edge>,
    conditional_edges: Vec<ConditionalEdge>,
    entry_point: Option<String>,
    finish_points: Vec<String>,
}

impl Default for StateGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StateGraph {
    /// Create a new, empty state graph.
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            nodes: HashMap::new(),
            guarded_nodes: Vec::new(),
            edges: Vec::new(),
            conditional_edges: Vec::new(),
            entry_point: None,
            finish_points: Vec::new(),
        }
    }

    /// Add a channel for a state key.
    pub fn add_channel(
        &mut self,
        name: impl Into<String>,
        spec: ChannelSpec,
        retention: Retention,
    ) -> &mut Self {
        self.channels
            .insert(name.into(), ChannelDef { spec, retention });
        self
    }

    /// Convenience: a replace-on-write key reset at every turn.
    pub fn add_last_value_channel(&mut self, name: impl Into<String>, default: Value) -> &mut Self {
        self.add_channel(name, ChannelSpec::LastValue { default }, Retention::Turn)
    }

    /// Convenience: a replace-on-write key carried across turns.
    pub fn add_session_value_channel(
        &mut self,
        name: impl Into<String>,
        default: Value,
    ) -> &mut Self {
        self.add_channel(name, ChannelSpec::LastValue { default }, Retention::Session)
    }

    /// Convenience: an append-only list carried across turns.
    pub fn add_append_channel(&mut self, name: impl Into<String>) -> &mut Self {
        self.add_channel(name, ChannelSpec::Append, Retention::Session)
    }

    /// Add a plain node. Its errors propagate out of the engine.
    ///
    /// Returns an error if a node with the same name already exists
    /// or if the name is a reserved sentinel (`__start__` / `__end__`).
    pub fn add_node(&mut self, node: NodeFn) -> Result<&mut Self> {
        let name = node.name().to_string();
        self.insert_node(name, GraphNode::Task(node))
    }

    /// Add a node wrapped by the error-interception guard.
    pub fn add_guarded_node(&mut self, node: NodeFn) -> Result<&mut Self> {
        let name = node.name().to_string();
        self.insert_node(name.clone(), GraphNode::Task(guarded(node)))?;
        self.guarded_nodes.push(name);
        Ok(self)
    }

    /// Add a node that may suspend the session.
    pub fn add_suspending_node(&mut self, node: Arc<dyn SuspendingNode>) -> Result<&mut Self> {
        let name = node.name().to_string();
        self.insert_node(name, GraphNode::Suspending(node))
    }

    fn insert_node(&mut self, name: String, node: GraphNode) -> Result<&mut Self> {
        if name == START || name == END {
            return Err(GraphError::InvalidGraph(format!(
                "Cannot add node with reserved name '{name}'"
            ))
            .into());
        }

        if self.nodes.contains_key(&name) {
            return Err(
                GraphError::InvalidGraph(format!("Duplicate node name: '{name}'")).into(),
            );
        }

        self.nodes.insert(name, node);
        Ok(self)
    }

    /// Add a static edge between two nodes.
    ///
    /// Both `from` and `to` can be node names or sentinels (`START` / `END`).
    /// An edge from `START` sets the entry point.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        let from = from.into();
        let to = to.into();
        if from == START {
            self.entry_point = Some(to);
        } else if to == END {
            self.finish_points.push(from);
        } else {
            self.edges.push(Edge::new(from, to));
        }
        self
    }

    /// Add a conditional edge from a source node.
    pub fn add_conditional_edges(&mut self, edge: ConditionalEdge) -> &mut Self {
        self.conditional_edges.push(edge);
        self
    }

    /// Set the entry point (first node to execute after `START`).
    pub fn set_entry_point(&mut self, node: impl Into<String>) -> &mut Self {
        self.entry_point = Some(node.into());
        self
    }

    /// Add a finish point (node that leads to `END`).
    pub fn set_finish_point(&mut self, node: impl Into<String>) -> &mut Self {
        self.finish_points.push(node.into());
        self
    }

    /// Validate the graph and produce a `CompiledStateGraph`.
    pub fn compile(self) -> Result<CompiledStateGraph> {
        let entry_point = self.validate()?;

        let mut adjacency: HashMap<String, String> = HashMap::new();
        for edge in &self.edges {
            adjacency.insert(edge.from.clone(), edge.to.clone());
        }
        for fp in &self.finish_points {
            adjacency.insert(fp.clone(), END.to_string());
        }

        let conditional_edges = self
            .conditional_edges
            .into_iter()
            .map(|ce| (ce.from.clone(), ce))
            .collect();

        Ok(CompiledStateGraph {
            nodes: self.nodes,
            adjacency,
            conditional_edges,
            channels: self.channels,
            entry_point,
        })
    }

    /// Validate the graph structure, returning the entry point.
    fn validate(&self) -> Result<String> {
        // 1. Entry point must be set and exist
        let entry = self
            .entry_point
            .clone()
            .ok_or_else(|| GraphError::InvalidGraph("Entry point not set".to_string()))?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::InvalidGraph(format!(
                "Entry point node '{entry}' does not exist"
            ))
            .into());
        }

        // 2. All edges must reference existing nodes (or END as a target)
        for edge in &self.edges {
            self.validate_node_ref(&edge.from, "edge source")?;
            self.validate_target(&edge.to, "edge target")?;
        }
        for fp in &self.finish_points {
            self.validate_node_ref(fp, "finish point")?;
        }

        // 3. Conditional edges: existing source, known targets
        for ce in &self.conditional_edges {
            self.validate_node_ref(&ce.from, "conditional edge source")?;
            for target in ce.targets() {
                self.validate_target(target, "conditional edge target")?;
            }
        }

        // 4. Sessions execute sequentially: at most one way out of each node
        let mut seen: HashSet<&str> = HashSet::new();
        let sources = self
            .edges
            .iter()
            .map(|e| e.from.as_str())
            .chain(self.finish_points.iter().map(|s| s.as_str()))
            .chain(self.conditional_edges.iter().map(|ce| ce.from.as_str()));
        for from in sources {
            if !seen.insert(from) {
                return Err(GraphError::InvalidGraph(format!(
                    "Node '{from}' has more than one outgoing route"
                ))
                .into());
            }
        }

        // 5. Guarded nodes report through errorContext, which must be a channel
        if !self.guarded_nodes.is_empty() {
            for key in [ERROR_CONTEXT_KEY, CURRENT_STAGE_KEY] {
                if !self.channels.contains_key(key) {
                    return Err(GraphError::InvalidGraph(format!(
                        "Guarded nodes require a '{key}' channel"
                    ))
                    .into());
                }
            }
        }

        // 6. BFS reachability check from entry point (cycles are allowed)
        self.validate_reachability(&entry)?;

        Ok(entry)
    }

    fn validate_node_ref(&self, name: &str, context: &str) -> Result<()> {
        if !self.nodes.contains_key(name) {
            return Err(GraphError::InvalidGraph(format!(
                "Unknown node '{name}' referenced as {context}"
            ))
            .into());
        }
        Ok(())
    }

    fn validate_target(&self, name: &str, context: &str) -> Result<()> {
        if name == END {
            return Ok(());
        }
        self.validate_node_ref(name, context)
    }

    /// BFS from entry point to check that all user-defined nodes are reachable.
    fn validate_reachability(&self, entry: &str) -> Result<()> {
        let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            adj.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
        }

        for ce in &self.conditional_edges {
            adj.entry(ce.from.as_str())
                .or_default()
                .extend(ce.targets().iter().map(|s| s.as_str()));
        }
        let all_node_names: Vec<&str> = self.nodes.keys().map(|s| s.as_str()).collect();

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(entry);
        visited.insert(entry);

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = adj.get(current) {
                for &next in neighbors {
                    if next != END && visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }

        let mut unreachable: Vec<&str> = all_node_names
            .into_iter()
            .filter(|n| !visited.contains(n))
            .collect();
        if !unreachable.is_empty() {
            unreachable.sort();
            return Err(GraphError::InvalidGraph(format!(
                "Unreachable nodes: {}",
                unreachable.join(", ")
            ))
            .into());
        }

        Ok(())
    }
}
