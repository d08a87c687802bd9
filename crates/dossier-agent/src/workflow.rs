//! Wiring of the research workflow graph.

use std::sync::Arc;

use serde_json::Value;

use dossier_core::config::WorkflowConfig;
use dossier_core::error::Result;
use dossier_core::oracle::Oracle;
use dossier_graph::compiled::CompiledStateGraph;
use dossier_graph::constants::{END, START};
use dossier_graph::edge::ConditionalEdge;
use dossier_graph::state_graph::StateGraph;
use dossier_research::client::ResearchClient;

use crate::routing::{
    route_after_clarity, route_after_research, route_after_synthesis, route_after_validation,
};
use crate::stages::names::{
    CLARIFICATION, CLARITY, ERROR_RECOVERY, RESEARCH, SYNTHESIS, VALIDATOR,
};
use crate::stages::{
    error_recovery_node, node, ClarificationStage, ClarityStage, ResearchStage, SynthesisStage,
    ValidatorStage,
};
use crate::state::register_channels;

/// Build and compile the research workflow.
///
/// ```text
/// START -> clarity -> clarification -> clarity (loop)
///                  -> research -> validator -> research (loop)
///                              -> synthesis -> END
/// any guarded stage failure -> error_recovery -> END
/// ```
///
/// Fails when `oracle` lacks structured output or `config` is invalid.
pub fn build_workflow(
    oracle: Arc<dyn Oracle>,
    research: Arc<dyn ResearchClient>,
    config: &WorkflowConfig,
) -> Result<CompiledStateGraph> {
    config.validate()?;

    let mut graph = StateGraph::new();
    register_channels(&mut graph);

    graph
        .add_guarded_node(node(Arc::new(ClarityStage::new(oracle.clone())?)))?
        .add_guarded_node(node(Arc::new(ResearchStage::new(research))))?
        .add_guarded_node(node(Arc::new(ValidatorStage::new(oracle.clone())?)))?
        .add_guarded_node(node(Arc::new(SynthesisStage::new(oracle))))?
        .add_suspending_node(Arc::new(ClarificationStage))?
        .add_node(error_recovery_node())?;

    let max_clarification = config.max_clarification_attempts;
    let threshold = config.confidence_threshold;
    let max_research = config.max_research_attempts;

    graph
        .add_edge(START, CLARITY)
        .add_conditional_edges(ConditionalEdge::new(
            CLARITY,
            move |state: &Value| route_after_clarity(state, max_clarification).to_string(),
            &[CLARIFICATION, RESEARCH, ERROR_RECOVERY, END],
        ))
        .add_edge(CLARIFICATION, CLARITY)
        .add_conditional_edges(ConditionalEdge::new(
            RESEARCH,
            move |state: &Value| route_after_research(state, threshold).to_string(),
            &[VALIDATOR, SYNTHESIS, ERROR_RECOVERY],
        ))
        .add_conditional_edges(ConditionalEdge::new(
            VALIDATOR,
            move |state: &Value| route_after_validation(state, max_research).to_string(),
            &[RESEARCH, SYNTHESIS, ERROR_RECOVERY],
        ))
        .add_conditional_edges(ConditionalEdge::new(
            SYNTHESIS,
            |state: &Value| route_after_synthesis(state).to_string(),
            &[ERROR_RECOVERY, END],
        ))
        .add_edge(ERROR_RECOVERY, END);

    graph.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::error::{DossierError, OracleError};
    use dossier_llm::mock::MockOracle;
    use dossier_research::mock::MockResearchClient;
    use serde_json::json;

    fn structured() -> Arc<dyn Oracle> {
        Arc::new(MockOracle::structured(|_, _, _| Ok(json!({}))))
    }

    #[test]
    fn compiles_all_stages() {
        let graph = build_workflow(
            structured(),
            Arc::new(MockResearchClient::found("Apple Inc.", 9.0)),
            &WorkflowConfig::default(),
        )
        .unwrap();
        let mut names = graph.node_names();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![CLARIFICATION, CLARITY, ERROR_RECOVERY, RESEARCH, SYNTHESIS, VALIDATOR]
        );
        assert_eq!(graph.entry_point(), CLARITY);
        assert!(graph.is_suspending(CLARIFICATION));
        assert!(!graph.is_suspending(CLARITY));
    }

    #[test]
    fn text_only_oracle_rejected() {
        let err = build_workflow(
            Arc::new(MockOracle::text_only(|_, _| Ok(String::new()))),
            Arc::new(MockResearchClient::found("Apple Inc.", 9.0)),
            &WorkflowConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, DossierError::Oracle(OracleError::StructuredUnsupported(_))));
    }

    #[test]
    fn invalid_config_rejected() {
        let config = WorkflowConfig {
            confidence_threshold: 11.0,
            ..Default::default()
        };
        let err = build_workflow(
            structured(),
            Arc::new(MockResearchClient::found("Apple Inc.", 9.0)),
            &config,
        )
        .err()
        .unwrap();
        assert!(matches!(err, DossierError::Config(_)));
    }
}
