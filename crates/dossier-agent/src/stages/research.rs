use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use dossier_core::config::RunConfig;
use dossier_core::error::Result;
use dossier_research::client::ResearchClient;
use dossier_research::types::SearchContext;

use super::names::RESEARCH;
use super::Stage;
use crate::state::{keys, ResearchState, StatePatch, ValidationResult};

/// Looks the subject up with the research provider. Every run counts as an
/// attempt, including runs that find nothing.
pub struct ResearchStage {
    client: Arc<dyn ResearchClient>,
}

impl ResearchStage {
    pub fn new(client: Arc<dyn ResearchClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Stage for ResearchStage {
    fn name(&self) -> &'static str {
        RESEARCH
    }

    async fn run(&self, state: &ResearchState, _config: &RunConfig) -> Result<Value> {
        let attempt = state.research_attempts + 1;
        let subject = state.search_subject();
        let prior_feedback = match state.validation_result {
            ValidationResult::Insufficient => state.validation_feedback.clone(),
            _ => None,
        };
        let context = SearchContext {
            original_query: state.original_query.clone(),
            prior_feedback,
            attempt_number: attempt,
        };

        let outcome = self.client.search(subject, &context).await?;

        let mut confidence = outcome.confidence_score;
        if !confidence.is_finite() {
            warn!(provider = %outcome.source_name, "provider returned a non-finite confidence");
            confidence = 0.0;
        }
        info!(
            correlation_id = %state.correlation_id,
            subject = %subject,
            attempt,
            provider = %outcome.source_name,
            found = outcome.findings.is_some(),
            confidence,
            "research attempt finished"
        );

        Ok(StatePatch::for_stage(RESEARCH)
            .set(keys::RESEARCH_ATTEMPTS, attempt)
            .findings(outcome.findings.as_ref())?
            .set(keys::CONFIDENCE_SCORE, confidence)
            .set(keys::VALIDATION_RESULT, ValidationResult::Pending.as_str())
            .into_value())
    }
}
