#![allow(dead_code)]

use std::sync::Arc;

use dossier_agent::prelude::*;
use dossier_checkpoint::prelude::*;
use dossier_core::prelude::*;
use dossier_llm::mock::MockOracle;
use dossier_research::prelude::*;
use serde_json::{json, Value};

pub const QUESTION: &str = "Which company do you mean?";

pub fn latest_message(prompt: &str) -> &str {
    prompt
        .rsplit_once("Latest user message: ")
        .map(|(_, m)| m.trim())
        .unwrap_or_default()
}

fn is_validation(schema: &Value) -> bool {
    schema["properties"].get("result").is_some()
}

/// Clarity answers for the scripted scenarios: names a known company when
/// the latest message or the retained entity identifies one.
pub fn clarity_answer(prompt: &str) -> Value {
    let latest = latest_message(prompt).to_lowercase();
    let entity = if latest.contains("apple") {
        Some("Apple Inc.")
    } else if latest.contains("microsoft") {
        Some("Microsoft Corporation")
    } else if latest.contains("acme") {
        Some("Acme Robotics")
    } else if latest.contains("their") && prompt.contains("Previously discussed company:") {
        return json!({"status": "clear", "entity": null, "question": null});
    } else {
        None
    };
    match entity {
        Some(e) => json!({"status": "clear", "entity": e, "question": null}),
        None => json!({"status": "needs_clarification", "entity": null, "question": QUESTION}),
    }
}

/// Scripted oracle; `verdict` answers validation prompts.
pub fn oracle_with_verdict(verdict: Value) -> Arc<MockOracle> {
    Arc::new(MockOracle::new(
        |_, user| {
            let subject = user
                .lines()
                .find_map(|l| l.strip_prefix("Company: "))
                .unwrap_or("the company");
            Ok(format!("Briefing on {}.", subject.trim_end_matches('.')))
        },
        move |_, user, schema| {
            if is_validation(schema) {
                Ok(verdict.clone())
            } else {
                Ok(clarity_answer(user))
            }
        },
    ))
}

pub fn oracle() -> Arc<MockOracle> {
    oracle_with_verdict(json!({"result": "sufficient", "feedback": null}))
}

pub fn agent(
    oracle: Arc<MockOracle>,
    research: Arc<dyn ResearchClient>,
    config: WorkflowConfig,
) -> ResearchAgent {
    ResearchAgent::new(oracle, research, Arc::new(MemoryCheckpointStore::new()), config).unwrap()
}

pub fn count_clarity_calls(oracle: &MockOracle) -> usize {
    oracle
        .calls()
        .iter()
        .filter(|c| c.structured && c.user_prompt.contains("Latest user message:"))
        .count()
}

pub fn count_validator_calls(oracle: &MockOracle) -> usize {
    oracle
        .calls()
        .iter()
        .filter(|c| c.structured && !c.user_prompt.contains("Latest user message:"))
        .count()
}
