use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use dossier_checkpoint::store::CheckpointStore;
use dossier_checkpoint::types::GraphOutput;
use dossier_core::config::WorkflowConfig;
use dossier_core::error::{DossierError, Result};
use dossier_core::message::Message;
use dossier_core::oracle::Oracle;
use dossier_graph::runner::GraphRunner;
use dossier_research::client::ResearchClient;

use crate::state::{keys, ResearchState, StatePatch};
use crate::workflow::build_workflow;

/// The question a suspended session is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationRequest {
    pub question: String,
    pub original_query: String,
    pub attempt_number: u32,
}

/// What a caller gets back from one turn or resume.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Answer { text: String, state: Box<ResearchState> },
    Clarification(ClarificationRequest),
}

impl TurnOutcome {
    pub fn answer(&self) -> Option<&str> {
        match self {
            TurnOutcome::Answer { text, .. } => Some(text),
            TurnOutcome::Clarification(_) => None,
        }
    }

    pub fn clarification(&self) -> Option<&ClarificationRequest> {
        match self {
            TurnOutcome::Clarification(request) => Some(request),
            TurnOutcome::Answer { .. } => None,
        }
    }
}

/// Entry point for callers: one workflow, many sessions.
///
/// ```ignore
/// let agent = ResearchAgent::new(oracle, research, store, WorkflowConfig::default())?;
/// match agent.submit("s-1", "Tell me about the company").await? {
///     TurnOutcome::Clarification(q) => println!("{}", q.question),
///     TurnOutcome::Answer { text, .. } => println!("{text}"),
/// }
/// ```
pub struct ResearchAgent {
    runner: GraphRunner,
    config: WorkflowConfig,
}

impl ResearchAgent {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        research: Arc<dyn ResearchClient>,
        store: Arc<dyn CheckpointStore>,
        config: WorkflowConfig,
    ) -> Result<Self> {
        let graph = build_workflow(oracle, research, &config)?;
        let runner = GraphRunner::new(graph, store)
            .with_timeout(config.timeout())
            .with_recursion_limit(config.recursion_limit);
        Ok(Self { runner, config })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn runner(&self) -> &GraphRunner {
        &self.runner
    }

    /// Start a new turn with `text` as the user's question.
    pub async fn ask(&self, session_id: &str, text: &str) -> Result<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DossierError::Other("question must not be empty".into()));
        }
        let correlation_id = Uuid::new_v4().to_string();
        info!(session_id, correlation_id = %correlation_id, "new question");
        let input = StatePatch::default()
            .set(keys::ORIGINAL_QUERY, text)
            .set(keys::CORRELATION_ID, correlation_id)
            .message(&Message::user(text))?
            .into_value();
        let output = self.runner.start_turn(session_id, input).await?;
        outcome(output)
    }

    /// Answer the clarifying question a session is suspended on.
    pub async fn resume(&self, session_id: &str, answer: &str) -> Result<TurnOutcome> {
        let output = self.runner.resume(session_id, Value::from(answer)).await?;
        outcome(output)
    }

    /// Resume when the session is waiting for an answer, ask otherwise.
    pub async fn submit(&self, session_id: &str, text: &str) -> Result<TurnOutcome> {
        if self.runner.pending(session_id).await?.is_some() {
            self.resume(session_id, text).await
        } else {
            self.ask(session_id, text).await
        }
    }

    /// The question a session is waiting on, if any.
    pub async fn pending(&self, session_id: &str) -> Result<Option<ClarificationRequest>> {
        match self.runner.pending(session_id).await? {
            Some(task) => Ok(Some(serde_json::from_value(task.payload)?)),
            None => Ok(None),
        }
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<Option<ResearchState>> {
        match self.runner.snapshot(session_id).await? {
            Some(state) => Ok(Some(ResearchState::from_value(&state)?)),
            None => Ok(None),
        }
    }

    pub async fn reset(&self, session_id: &str) -> Result<()> {
        self.runner.reset_session(session_id).await
    }
}

fn outcome(output: GraphOutput) -> Result<TurnOutcome> {
    match output {
        GraphOutput::Complete(state) => {
            let state = ResearchState::from_value(&state)?;
            let text = state
                .final_output
                .clone()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| DossierError::Other("workflow finished without an answer".into()))?;
            Ok(TurnOutcome::Answer {
                text,
                state: Box::new(state),
            })
        }
        GraphOutput::Suspended { payload, .. } => {
            Ok(TurnOutcome::Clarification(serde_json::from_value(payload)?))
        }
    }
}
