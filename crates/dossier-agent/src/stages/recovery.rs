//! Terminal fallback for any stage failure. Never fails and always leaves a
//! non-empty answer.

use serde_json::{json, Map, Value};
use tracing::warn;

use dossier_core::message::Message;
use dossier_graph::guard::ErrorContext;
use dossier_graph::node::NodeFn;
use dossier_research::types::Findings;

use super::names::{CLARITY, ERROR_RECOVERY, RESEARCH, SYNTHESIS, VALIDATOR};
use crate::state::keys;

pub fn recovery_message(context: Option<&ErrorContext>, partial: Option<&Findings>) -> String {
    let failed = context.map(|c| c.failed_stage.as_str()).unwrap_or_default();
    let mut text = match failed {
        CLARITY => "Sorry, I had trouble understanding your request.".to_string(),
        RESEARCH => "Sorry, I couldn't reach the research service.".to_string(),
        VALIDATOR => "Sorry, I couldn't check the quality of what I found.".to_string(),
        SYNTHESIS => "Sorry, I couldn't put the answer together.".to_string(),
        _ => "Sorry, something went wrong while handling your request.".to_string(),
    };
    if context.is_some_and(|c| c.retryable) {
        text.push_str(" This looks temporary, so please try again in a moment.");
    } else {
        text.push_str(" Please try rephrasing your question.");
    }

    if let Some(findings) = partial {
        text.push_str(&format!("\n\nHere is what I found about {} so far:", findings.subject));
        for (label, section) in [
            ("Overview", &findings.overview),
            ("Financials", &findings.financials),
            ("Recent news", &findings.recent_news),
        ] {
            if let Some(body) = section.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                text.push_str(&format!("\n- {label}: {body}"));
            }
        }
    }
    text
}

fn recover(state: &Value) -> Value {
    let context = state
        .get(keys::ERROR_CONTEXT)
        .and_then(|c| serde_json::from_value::<ErrorContext>(c.clone()).ok());
    let partial = state
        .get(keys::FINDINGS)
        .and_then(|f| serde_json::from_value::<Findings>(f.clone()).ok());
    warn!(
        failed_stage = context.as_ref().map(|c| c.failed_stage.as_str()),
        error = context.as_ref().map(|c| c.message.as_str()),
        partial = partial.is_some(),
        "recovering from stage failure"
    );

    let answer = recovery_message(context.as_ref(), partial.as_ref());
    let message = Message::assistant(answer.as_str());
    let mut patch = Map::new();
    patch.insert(keys::FINAL_OUTPUT.into(), json!(answer));
    patch.insert(keys::ERROR_CONTEXT.into(), Value::Null);
    patch.insert(keys::CURRENT_STAGE.into(), json!(ERROR_RECOVERY));
    patch.insert(keys::CONVERSATION.into(), json!([message]));
    Value::Object(patch)
}

/// The recovery stage as an unguarded graph node.
pub fn error_recovery_node() -> NodeFn {
    NodeFn::new(ERROR_RECOVERY, |state: Value, _config| async move { Ok(recover(&state)) })
}
