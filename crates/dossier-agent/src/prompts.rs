//! Prompt text and output schemas for the oracle-backed stages.

use serde_json::{json, Value};

use dossier_core::message::transcript;
use dossier_research::types::Findings;

use crate::state::ResearchState;

/// Conversation entries shown to the oracle for context.
pub const HISTORY_WINDOW: usize = 6;

pub const CLARITY_SYSTEM: &str = "You help a user research companies. Decide whether the \
user's latest message identifies exactly one company. If it does, answer with status \
\"clear\" and the company's full official name as entity. If it is ambiguous, generic \
or names no company, answer with status \"needs_clarification\" and a short question \
asking which company they mean. Use the conversation history and the previously \
discussed company to resolve references such as \"they\" or \"that company\".";

pub const VALIDATOR_SYSTEM: &str = "You review research notes about a company. Decide \
whether they are sufficient to answer the user's question. Answer \"sufficient\" or \
\"insufficient\"; when insufficient, give brief feedback naming what is missing so the \
next search can target it.";

pub const SYNTHESIS_SYSTEM: &str = "You write concise company briefings. Using only the \
research notes provided, answer the user's question in a few short paragraphs. Mention \
when information is incomplete. Do not invent figures.";

pub fn clarity_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "status": {"type": "string", "enum": ["clear", "needs_clarification"]},
            "entity": {"type": ["string", "null"]},
            "question": {"type": ["string", "null"]}
        },
        "required": ["status", "entity", "question"],
        "additionalProperties": false
    })
}

pub fn validation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "result": {"type": "string", "enum": ["sufficient", "insufficient"]},
            "feedback": {"type": ["string", "null"]}
        },
        "required": ["result", "feedback"],
        "additionalProperties": false
    })
}

pub fn clarity_prompt(state: &ResearchState) -> String {
    let mut prompt = String::new();
    if !state.conversation.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&transcript(&state.conversation, HISTORY_WINDOW));
        prompt.push_str("\n\n");
    }
    if let Some(entity) = &state.detected_entity {
        prompt.push_str(&format!("Previously discussed company: {entity}\n"));
    }
    prompt.push_str(&format!("Original request: {}\n", state.original_query.trim()));
    if let Some(question) = &state.clarification_question {
        prompt.push_str(&format!("We asked: {question}\n"));
    }
    prompt.push_str(&format!("Latest user message: {}", state.latest_user_input()));
    prompt
}

pub fn validation_prompt(state: &ResearchState, findings: &Findings) -> String {
    format!(
        "User request: {}\nCompany: {}\nResearch attempt: {}\nProvider confidence: {:.1}/10\n\nResearch notes:\n{}",
        state.original_query.trim(),
        findings.subject,
        state.research_attempts,
        state.confidence_score,
        render_findings(findings),
    )
}

pub fn synthesis_prompt(state: &ResearchState, findings: &Findings) -> String {
    let mut prompt = format!(
        "User request: {}\nCompany: {}\n\nResearch notes:\n{}",
        state.original_query.trim(),
        findings.subject,
        render_findings(findings),
    );
    if let Some(feedback) = &state.validation_feedback {
        prompt.push_str(&format!("\n\nKnown gaps: {feedback}"));
    }
    prompt
}

/// Findings as labelled sections, omitting empty ones.
pub fn render_findings(findings: &Findings) -> String {
    let mut out = Vec::new();
    for (label, section) in [
        ("Overview", &findings.overview),
        ("Financials", &findings.financials),
        ("Recent news", &findings.recent_news),
    ] {
        if let Some(text) = section.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            out.push(format!("{label}: {text}"));
        }
    }
    if out.is_empty() && !findings.raw.trim().is_empty() {
        out.push(findings.raw.trim().to_string());
    }
    if !findings.sources.is_empty() {
        out.push(format!("Sources: {}", findings.sources.join(", ")));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::message::Message;

    #[test]
    fn clarity_prompt_includes_history_and_entity() {
        let state = ResearchState {
            conversation: vec![
                Message::user("Tell me about Apple"),
                Message::assistant("Apple Inc. designs consumer electronics."),
                Message::user("What about their revenue?"),
            ],
            original_query: "What about their revenue?".into(),
            detected_entity: Some("Apple Inc.".into()),
            ..Default::default()
        };
        let prompt = clarity_prompt(&state);
        assert!(prompt.contains("assistant: Apple Inc. designs consumer electronics."));
        assert!(prompt.contains("Previously discussed company: Apple Inc."));
        assert!(prompt.ends_with("Latest user message: What about their revenue?"));
    }

    #[test]
    fn render_findings_skips_empty_sections() {
        let findings = Findings {
            subject: "Acme".into(),
            overview: Some("Robots.".into()),
            financials: Some(" ".into()),
            sources: vec!["https://acme.example".into()],
            ..Default::default()
        };
        assert_eq!(
            render_findings(&findings),
            "Overview: Robots.\nSources: https://acme.example"
        );
    }
}
