use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use dossier_core::config::RunConfig;
use dossier_core::error::{Result, SuspensionError};
use dossier_core::message::Message;
use dossier_graph::suspend::{Prepared, SuspendingNode};

use super::clarity::DEFAULT_QUESTION;
use super::names::CLARIFICATION;
use crate::state::{keys, StatePatch};

pub const SUSPEND_REASON: &str = "needs_clarification";

/// Suspends the run and waits for the user to answer the clarifying
/// question. Reads state leniently so a damaged record can still be
/// surfaced to the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClarificationStage;

fn question(state: &Value) -> &str {
    state
        .get(keys::CLARIFICATION_QUESTION)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(DEFAULT_QUESTION)
}

#[async_trait]
impl SuspendingNode for ClarificationStage {
    fn name(&self) -> &str {
        CLARIFICATION
    }

    fn prepare(&self, state: &Value) -> Result<Prepared> {
        let original = state
            .get(keys::ORIGINAL_QUERY)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let attempt = state
            .get(keys::CLARIFICATION_ATTEMPTS)
            .and_then(Value::as_u64)
            .unwrap_or(1);
        Ok(Prepared::Suspend(json!({
            "reason": SUSPEND_REASON,
            "question": question(state),
            "originalQuery": original,
            "attemptNumber": attempt,
        })))
    }

    fn validate_resume(&self, value: &Value) -> Result<()> {
        let reason = match value.as_str() {
            Some(text) if !text.trim().is_empty() => return Ok(()),
            Some(_) => "answer must not be empty",
            None => "answer must be a string",
        };
        Err(SuspensionError::InvalidResumeValue {
            stage: CLARIFICATION.to_string(),
            reason: reason.to_string(),
        }
        .into())
    }

    async fn resume(&self, state: &Value, value: Value, _config: &RunConfig) -> Result<Value> {
        self.validate_resume(&value)?;
        let answer = value.as_str().unwrap_or_default().to_string();
        debug!(answer = %answer, "clarification answered");
        Ok(StatePatch::for_stage(CLARIFICATION)
            .message(&Message::assistant(question(state)))?
            .message(&Message::user(answer.as_str()))?
            .set(keys::CLARIFICATION_RESPONSE, answer)
            .into_value())
    }
}
