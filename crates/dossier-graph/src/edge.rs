use std::sync::Arc;

use serde_json::Value;

use dossier_core::error::{GraphError, Result};

/// Unconditional transition.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let (from, to) = (from.into(), to.into());
        Self { from, to }
    }
}

type Router = dyn Fn(&Value) -> String + Send + Sync;

/// Transition chosen by a router at run time, among a fixed set of targets.
///
/// The declared targets let `compile()` check names and reachability; a
/// router that names anything else fails the run.
pub struct ConditionalEdge {
    pub from: String,
    router: Arc<Router>,
    targets: Vec<String>,
}

impl ConditionalEdge {
    pub fn new<R>(from: impl Into<String>, router: R, targets: &[&str]) -> Self
    where
        R: Fn(&Value) -> String + Send + Sync + 'static,
    {
        Self {
            from: from.into(),
            router: Arc::new(router),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Run the router against `state`.
    pub fn resolve(&self, state: &Value) -> Result<String> {
        let target = (self.router)(state);
        if self.targets.contains(&target) {
            Ok(target)
        } else {
            Err(GraphError::InvalidGraph(format!(
                "router of '{}' chose undeclared target '{target}'",
                self.from
            ))
            .into())
        }
    }
}
