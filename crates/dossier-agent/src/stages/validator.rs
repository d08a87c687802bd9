use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use dossier_core::config::RunConfig;
use dossier_core::error::{OracleError, Result};
use dossier_core::oracle::{invoke_structured, require_structured, Oracle};

use super::names::VALIDATOR;
use super::Stage;
use crate::prompts::{validation_prompt, validation_schema, VALIDATOR_SYSTEM};
use crate::state::{keys, ResearchState, StatePatch, ValidationResult};

#[derive(Debug, Deserialize)]
struct Verdict {
    result: ValidationResult,
    #[serde(default)]
    feedback: Option<String>,
}

/// Asks the oracle whether low-confidence findings are good enough.
pub struct ValidatorStage {
    oracle: Arc<dyn Oracle>,
}

impl ValidatorStage {
    pub fn new(oracle: Arc<dyn Oracle>) -> Result<Self> {
        require_structured(oracle.as_ref())?;
        Ok(Self { oracle })
    }
}

#[async_trait]
impl Stage for ValidatorStage {
    fn name(&self) -> &'static str {
        VALIDATOR
    }

    async fn run(&self, state: &ResearchState, _config: &RunConfig) -> Result<Value> {
        let patch = StatePatch::for_stage(VALIDATOR);
        let Some(findings) = &state.findings else {
            return Ok(patch
                .set(keys::VALIDATION_RESULT, ValidationResult::Insufficient.as_str())
                .set(keys::VALIDATION_FEEDBACK, "No findings were returned.")
                .into_value());
        };

        let raw = invoke_structured(
            self.oracle.as_ref(),
            VALIDATOR_SYSTEM,
            &validation_prompt(state, findings),
            &validation_schema(),
        )
        .await?;
        let verdict: Verdict = serde_json::from_value(raw)
            .map_err(|e| OracleError::InvalidResponse(format!("validation verdict: {e}")))?;
        if verdict.result == ValidationResult::Pending {
            return Err(
                OracleError::InvalidResponse("validation verdict was 'pending'".into()).into(),
            );
        }
        let feedback = verdict
            .feedback
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());

        info!(
            correlation_id = %state.correlation_id,
            result = verdict.result.as_str(),
            attempt = state.research_attempts,
            "findings validated"
        );
        let patch = patch.set(keys::VALIDATION_RESULT, verdict.result.as_str());
        Ok(match feedback {
            Some(f) => patch.set(keys::VALIDATION_FEEDBACK, f),
            None => patch.clear(keys::VALIDATION_FEEDBACK),
        }
        .into_value())
    }
}
