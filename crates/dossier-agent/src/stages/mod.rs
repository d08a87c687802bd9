//! Workflow stages. Each reads the typed state and returns a partial patch.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use dossier_core::config::RunConfig;
use dossier_core::error::Result;
use dossier_graph::node::NodeFn;

use crate::state::ResearchState;

pub mod clarification;
pub mod clarity;
pub mod recovery;
pub mod research;
pub mod synthesis;
pub mod validator;

pub use clarification::ClarificationStage;
pub use clarity::ClarityStage;
pub use recovery::error_recovery_node;
pub use research::ResearchStage;
pub use synthesis::SynthesisStage;
pub use validator::ValidatorStage;

pub mod names {
    pub const CLARITY: &str = "clarity";
    pub const CLARIFICATION: &str = "clarification";
    pub const RESEARCH: &str = "research";
    pub const VALIDATOR: &str = "validator";
    pub const SYNTHESIS: &str = "synthesis";
    pub const ERROR_RECOVERY: &str = "error_recovery";
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, state: &ResearchState, config: &RunConfig) -> Result<Value>;
}

/// Adapt a stage to a graph node. A state that does not parse fails the
/// stage like any other error.
pub fn node<S: Stage + 'static>(stage: Arc<S>) -> NodeFn {
    NodeFn::new(stage.name(), move |state: Value, config: RunConfig| {
        let stage = Arc::clone(&stage);
        async move {
            let typed = ResearchState::from_value(&state)?;
            stage.run(&typed, &config).await
        }
    })
}
