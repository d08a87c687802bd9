use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use dossier_core::config::RunConfig;
use dossier_core::error::{DossierError, OracleError, Result};
use dossier_core::message::Message;
use dossier_core::oracle::{invoke_structured, require_structured, Oracle};

use super::names::CLARITY;
use super::Stage;
use crate::prompts::{clarity_prompt, clarity_schema, CLARITY_SYSTEM};
use crate::state::{keys, ClarityStatus, ResearchState, StatePatch};

pub const DEFAULT_QUESTION: &str = "Which company would you like me to research?";
pub const CANCEL_ACK: &str =
    "Okay, I've cancelled this request. Ask me about a company whenever you're ready.";

const CANCEL_PATTERN: &str =
    r"(?i)^\s*(cancel|never\s*mind|forget\s+it|quit|stop|exit|abort)\s*[.!]*\s*$";

#[derive(Debug, Deserialize)]
struct ClarityAnalysis {
    status: ClarityStatus,
    #[serde(default)]
    entity: Option<String>,
    #[serde(default)]
    question: Option<String>,
}

/// Decides whether the request names one company.
pub struct ClarityStage {
    oracle: Arc<dyn Oracle>,
    cancel: Regex,
}

impl ClarityStage {
    /// Fails when the oracle cannot produce structured output.
    pub fn new(oracle: Arc<dyn Oracle>) -> Result<Self> {
        require_structured(oracle.as_ref())?;
        let cancel = Regex::new(CANCEL_PATTERN)
            .map_err(|e| DossierError::Config(format!("invalid cancel pattern: {e}")))?;
        Ok(Self { oracle, cancel })
    }

    pub fn is_cancel(&self, text: &str) -> bool {
        self.cancel.is_match(text)
    }

    fn cancelled(&self) -> Result<Value> {
        Ok(StatePatch::for_stage(CLARITY)
            .set(keys::FINAL_OUTPUT, CANCEL_ACK)
            .message(&Message::assistant(CANCEL_ACK))?
            .into_value())
    }
}

#[async_trait]
impl Stage for ClarityStage {
    fn name(&self) -> &'static str {
        CLARITY
    }

    async fn run(&self, state: &ResearchState, _config: &RunConfig) -> Result<Value> {
        if let Some(answer) = &state.clarification_response {
            if self.is_cancel(answer) {
                info!(correlation_id = %state.correlation_id, "clarification cancelled by user");
                return self.cancelled();
            }
        }

        let raw = invoke_structured(
            self.oracle.as_ref(),
            CLARITY_SYSTEM,
            &clarity_prompt(state),
            &clarity_schema(),
        )
        .await?;
        let analysis: ClarityAnalysis = serde_json::from_value(raw)
            .map_err(|e| OracleError::InvalidResponse(format!("clarity analysis: {e}")))?;

        let patch = StatePatch::for_stage(CLARITY).set(keys::CLARITY_STATUS, analysis.status.as_str());
        let patch = match analysis.status {
            ClarityStatus::Clear => {
                let entity = analysis
                    .entity
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty());
                info!(correlation_id = %state.correlation_id, entity = ?entity, "query is clear");
                let patch = patch.clear(keys::CLARIFICATION_QUESTION);
                match entity {
                    Some(entity) => patch.set(keys::DETECTED_ENTITY, entity),
                    None => patch,
                }
            }
            ClarityStatus::NeedsClarification => {
                let attempts = state.clarification_attempts + 1;
                let question = analysis
                    .question
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .unwrap_or_else(|| DEFAULT_QUESTION.to_string());
                info!(correlation_id = %state.correlation_id, attempt = attempts, "query needs clarification");
                patch
                    .set(keys::CLARIFICATION_ATTEMPTS, attempts)
                    .set(keys::CLARIFICATION_QUESTION, question)
            }
            ClarityStatus::Pending => {
                return Err(OracleError::InvalidResponse(
                    "clarity analysis returned status 'pending'".into(),
                )
                .into());
            }
        };
        Ok(patch.into_value())
    }
}
