//! The research state record and its reducer table.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use dossier_core::error::Result;
use dossier_core::message::Message;
use dossier_graph::guard::{ErrorContext, CURRENT_STAGE_KEY, ERROR_CONTEXT_KEY};
use dossier_graph::state_graph::StateGraph;
use dossier_research::types::Findings;

pub mod keys {
    pub const CONVERSATION: &str = "conversation";
    pub const ORIGINAL_QUERY: &str = "originalQuery";
    pub const CLARIFICATION_QUESTION: &str = "clarificationQuestion";
    pub const CLARIFICATION_RESPONSE: &str = "clarificationResponse";
    pub const CLARITY_STATUS: &str = "clarityStatus";
    pub const CLARIFICATION_ATTEMPTS: &str = "clarificationAttempts";
    pub const DETECTED_ENTITY: &str = "detectedEntity";
    pub const FINDINGS: &str = "findings";
    pub const CONFIDENCE_SCORE: &str = "confidenceScore";
    pub const RESEARCH_ATTEMPTS: &str = "researchAttempts";
    pub const VALIDATION_RESULT: &str = "validationResult";
    pub const VALIDATION_FEEDBACK: &str = "validationFeedback";
    pub const FINAL_OUTPUT: &str = "finalOutput";
    pub const CURRENT_STAGE: &str = super::CURRENT_STAGE_KEY;
    pub const ERROR_CONTEXT: &str = super::ERROR_CONTEXT_KEY;
    pub const CORRELATION_ID: &str = "correlationId";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarityStatus {
    #[default]
    Pending,
    Clear,
    NeedsClarification,
}

impl ClarityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClarityStatus::Pending => "pending",
            ClarityStatus::Clear => "clear",
            ClarityStatus::NeedsClarification => "needs_clarification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationResult {
    #[default]
    Pending,
    Sufficient,
    Insufficient,
}

impl ValidationResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationResult::Pending => "pending",
            ValidationResult::Sufficient => "sufficient",
            ValidationResult::Insufficient => "insufficient",
        }
    }
}

/// Typed view of the state threaded through every stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResearchState {
    pub conversation: Vec<Message>,
    pub original_query: String,
    pub clarification_question: Option<String>,
    pub clarification_response: Option<String>,
    pub clarity_status: ClarityStatus,
    pub clarification_attempts: u32,
    pub detected_entity: Option<String>,
    pub findings: Option<Findings>,
    pub confidence_score: f64,
    pub research_attempts: u32,
    pub validation_result: ValidationResult,
    pub validation_feedback: Option<String>,
    pub final_output: Option<String>,
    pub current_stage: String,
    pub error_context: Option<ErrorContext>,
    pub correlation_id: String,
}

impl ResearchState {
    pub fn from_value(state: &Value) -> Result<Self> {
        Ok(serde_json::from_value(state.clone())?)
    }

    /// The text the clarity stage should interpret: the latest clarification
    /// answer when there is one, the original query otherwise.
    pub fn latest_user_input(&self) -> &str {
        match self.clarification_response.as_deref().map(str::trim) {
            Some(answer) if !answer.is_empty() => answer,
            _ => self.original_query.trim(),
        }
    }

    /// Best available name to research.
    pub fn search_subject(&self) -> &str {
        match self.detected_entity.as_deref().map(str::trim) {
            Some(entity) if !entity.is_empty() => entity,
            _ => self.latest_user_input(),
        }
    }
}

/// Register the reducer table: `conversation` appends and, together with
/// `detectedEntity`, survives across turns; every other key is replaced on
/// write and reset at the start of each turn.
pub fn register_channels(graph: &mut StateGraph) {
    graph
        .add_append_channel(keys::CONVERSATION)
        .add_session_value_channel(keys::DETECTED_ENTITY, Value::Null)
        .add_last_value_channel(keys::ORIGINAL_QUERY, json!(""))
        .add_last_value_channel(keys::CLARIFICATION_QUESTION, Value::Null)
        .add_last_value_channel(keys::CLARIFICATION_RESPONSE, Value::Null)
        .add_last_value_channel(keys::CLARITY_STATUS, json!(ClarityStatus::Pending.as_str()))
        .add_last_value_channel(keys::CLARIFICATION_ATTEMPTS, json!(0))
        .add_last_value_channel(keys::FINDINGS, Value::Null)
        .add_last_value_channel(keys::CONFIDENCE_SCORE, json!(0))
        .add_last_value_channel(keys::RESEARCH_ATTEMPTS, json!(0))
        .add_last_value_channel(keys::VALIDATION_RESULT, json!(ValidationResult::Pending.as_str()))
        .add_last_value_channel(keys::VALIDATION_FEEDBACK, Value::Null)
        .add_last_value_channel(keys::FINAL_OUTPUT, Value::Null)
        .add_last_value_channel(keys::CURRENT_STAGE, json!(""))
        .add_last_value_channel(keys::ERROR_CONTEXT, Value::Null)
        .add_last_value_channel(keys::CORRELATION_ID, json!(""));
}

/// Builder for a stage's partial state update.
#[derive(Debug, Default, Clone)]
pub struct StatePatch(Map<String, Value>);

impl StatePatch {
    /// A patch that records `stage` as the current stage.
    pub fn for_stage(stage: &str) -> Self {
        Self::default().set(keys::CURRENT_STAGE, stage)
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn clear(self, key: &str) -> Self {
        self.set(key, Value::Null)
    }

    pub fn message(mut self, message: &Message) -> Result<Self> {
        let entry = serde_json::to_value(message)?;
        match self.0.get_mut(keys::CONVERSATION) {
            Some(Value::Array(items)) => items.push(entry),
            _ => {
                self.0
                    .insert(keys::CONVERSATION.to_string(), Value::Array(vec![entry]));
            }
        }
        Ok(self)
    }

    pub fn findings(self, findings: Option<&Findings>) -> Result<Self> {
        let value = match findings {
            Some(f) => serde_json::to_value(f)?,
            None => Value::Null,
        };
        Ok(self.set(keys::FINDINGS, value))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_graph::constants::{END, START};
    use dossier_graph::node::NodeFn;

    #[test]
    fn parses_default_state() {
        let state = ResearchState::from_value(&json!({})).unwrap();
        assert_eq!(state.clarity_status, ClarityStatus::Pending);
        assert_eq!(state.validation_result, ValidationResult::Pending);
        assert!(state.error_context.is_none());
    }

    #[test]
    fn parses_camel_case_state() {
        let state = ResearchState::from_value(&json!({
            "originalQuery": "Tell me about Apple",
            "clarityStatus": "needs_clarification",
            "clarificationAttempts": 1,
            "detectedEntity": "Apple Inc.",
            "conversation": [{"role": "user", "content": "Tell me about Apple"}],
            "errorContext": {"failedStage": "research", "message": "boom", "retryable": true}
        }))
        .unwrap();
        assert_eq!(state.clarity_status, ClarityStatus::NeedsClarification);
        assert_eq!(state.clarification_attempts, 1);
        assert_eq!(state.conversation, vec![Message::user("Tell me about Apple")]);
        assert_eq!(state.error_context.unwrap().failed_stage, "research");
    }

    #[test]
    fn malformed_state_is_an_error() {
        assert!(ResearchState::from_value(&json!({"researchAttempts": -1})).is_err());
        assert!(ResearchState::from_value(&json!({"clarityStatus": "maybe"})).is_err());
    }

    #[test]
    fn latest_input_prefers_clarification_answer() {
        let mut state = ResearchState {
            original_query: "Tell me about the company".into(),
            ..Default::default()
        };
        assert_eq!(state.latest_user_input(), "Tell me about the company");
        state.clarification_response = Some("  ".into());
        assert_eq!(state.latest_user_input(), "Tell me about the company");
        state.clarification_response = Some("Apple".into());
        assert_eq!(state.latest_user_input(), "Apple");
        assert_eq!(state.search_subject(), "Apple");
        state.detected_entity = Some("Apple Inc.".into());
        assert_eq!(state.search_subject(), "Apple Inc.");
    }

    #[test]
    fn patch_builder() {
        let patch = StatePatch::for_stage("clarity")
            .set(keys::CLARIFICATION_ATTEMPTS, 2)
            .clear(keys::CLARIFICATION_QUESTION)
            .message(&Message::user("a"))
            .unwrap()
            .message(&Message::assistant("b"))
            .unwrap()
            .into_value();
        assert_eq!(patch["currentStage"], "clarity");
        assert_eq!(patch["clarificationAttempts"], 2);
        assert!(patch["clarificationQuestion"].is_null());
        assert_eq!(patch["conversation"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn reducer_table_compiles_with_guarded_stage() {
        let mut graph = StateGraph::new();
        register_channels(&mut graph);
        graph
            .add_guarded_node(NodeFn::new("noop", |_s: Value, _c| async move { Ok(json!({})) }))
            .unwrap();
        graph.add_edge(START, "noop");
        graph.add_edge("noop", END);
        let compiled = graph.compile().unwrap();
        assert!(compiled.has_channel(keys::CONVERSATION));
        assert!(compiled.has_channel(keys::ERROR_CONTEXT));
    }
}
