use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use dossier_core::config::RunConfig;
use dossier_core::error::{OracleError, Result};
use dossier_core::message::Message;
use dossier_core::oracle::Oracle;

use super::names::SYNTHESIS;
use super::Stage;
use crate::prompts::{synthesis_prompt, SYNTHESIS_SYSTEM};
use crate::state::{keys, ResearchState, StatePatch};

/// Writes the final answer for the turn.
pub struct SynthesisStage {
    oracle: Arc<dyn Oracle>,
}

impl SynthesisStage {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }
}

pub fn not_found_message(subject: &str) -> String {
    let subject = match subject.trim() {
        "" => "that company",
        s => s,
    };
    format!(
        "I couldn't find reliable information about {subject}. \
         Could you check the name, or ask about a different company?"
    )
}

#[async_trait]
impl Stage for SynthesisStage {
    fn name(&self) -> &'static str {
        SYNTHESIS
    }

    async fn run(&self, state: &ResearchState, _config: &RunConfig) -> Result<Value> {
        let answer = match &state.findings {
            None => not_found_message(state.search_subject()),
            Some(findings) => {
                let text = self
                    .oracle
                    .invoke(SYNTHESIS_SYSTEM, &synthesis_prompt(state, findings))
                    .await?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(OracleError::InvalidResponse("empty synthesis".into()).into());
                }
                text.to_string()
            }
        };
        info!(
            correlation_id = %state.correlation_id,
            found = state.findings.is_some(),
            chars = answer.len(),
            "answer synthesized"
        );
        Ok(StatePatch::for_stage(SYNTHESIS)
            .message(&Message::assistant(answer.as_str()))?
            .set(keys::FINAL_OUTPUT, answer)
            .into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::error::DossierError;
    use dossier_llm::mock::MockOracle;
    use dossier_research::mock::outcome_for;

    #[tokio::test]
    async fn writes_answer_and_message() {
        let oracle = Arc::new(MockOracle::text_only(|_, _| Ok("  Apple makes phones.  ".into())));
        let stage = SynthesisStage::new(oracle);
        let state = ResearchState {
            findings: outcome_for("Apple Inc.", 9.0).findings,
            ..Default::default()
        };
        let patch = stage.run(&state, &RunConfig::default()).await.unwrap();
        assert_eq!(patch["finalOutput"], "Apple makes phones.");
        assert_eq!(patch["conversation"][0]["role"], "assistant");
        assert_eq!(patch["currentStage"], "synthesis");
    }

    #[tokio::test]
    async fn no_findings_is_deterministic() {
        let oracle = Arc::new(MockOracle::text_only(|_, _| Ok("unused".into())));
        let stage = SynthesisStage::new(oracle.clone());
        let state = ResearchState {
            original_query: "Zzyzx Holdings".into(),
            ..Default::default()
        };
        let patch = stage.run(&state, &RunConfig::default()).await.unwrap();
        assert_eq!(patch["finalOutput"], not_found_message("Zzyzx Holdings"));
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_answer_is_an_error() {
        let stage = SynthesisStage::new(Arc::new(MockOracle::text_only(|_, _| Ok("\n".into()))));
        let state = ResearchState {
            findings: outcome_for("Apple Inc.", 9.0).findings,
            ..Default::default()
        };
        let err = stage.run(&state, &RunConfig::default()).await.unwrap_err();
        assert!(matches!(err, DossierError::Oracle(OracleError::InvalidResponse(_))));
    }
}
