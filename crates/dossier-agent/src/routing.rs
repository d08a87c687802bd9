//! Routers: pure, infallible functions from state to the next stage.
//!
//! Routers read the raw state value rather than the typed view so that a
//! malformed field degrades to the most conservative route instead of an
//! error. Every router checks `errorContext` first.

use serde_json::Value;
use tracing::warn;

use dossier_graph::constants::END;
use dossier_graph::guard::has_error;

use crate::stages::names::{CLARIFICATION, ERROR_RECOVERY, RESEARCH, SYNTHESIS, VALIDATOR};
use crate::state::keys;

/// Attempt counters must be non-negative integers.
fn attempts(state: &Value, key: &str) -> Option<u64> {
    state.get(key)?.as_u64()
}

fn non_empty_str<'a>(state: &'a Value, key: &str) -> Option<&'a str> {
    state
        .get(key)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// After clarity: cancelled → END, ambiguous with questions left → ask,
/// anything else → research.
pub fn route_after_clarity(state: &Value, max_clarification_attempts: u32) -> &'static str {
    if has_error(state) {
        return ERROR_RECOVERY;
    }
    if non_empty_str(state, keys::FINAL_OUTPUT).is_some() {
        return END;
    }

    let status = state.get(keys::CLARITY_STATUS).and_then(Value::as_str);
    match status {
        Some("needs_clarification") => match attempts(state, keys::CLARIFICATION_ATTEMPTS) {
            Some(n) if n <= u64::from(max_clarification_attempts) => CLARIFICATION,
            Some(n) => {
                warn!(attempts = n, max = max_clarification_attempts, "clarification attempts exhausted; researching best guess");
                RESEARCH
            }
            None => {
                warn!("clarificationAttempts is malformed; researching best guess");
                RESEARCH
            }
        },
        Some("clear") => {
            if non_empty_str(state, keys::DETECTED_ENTITY).is_none() {
                warn!("query marked clear without a detected entity");
            }
            RESEARCH
        }
        other => {
            warn!(status = ?other, "unexpected clarity status; researching");
            RESEARCH
        }
    }
}

/// Confidence must be a finite number within [0, 10].
fn confidence(state: &Value) -> Option<f64> {
    state
        .get(keys::CONFIDENCE_SCORE)?
        .as_f64()
        .filter(|c| c.is_finite() && (0.0..=10.0).contains(c))
}

/// After research: nothing found → synthesis, confident → synthesis,
/// otherwise → validator.
pub fn route_after_research(state: &Value, confidence_threshold: f64) -> &'static str {
    if has_error(state) {
        return ERROR_RECOVERY;
    }
    if state.get(keys::FINDINGS).is_none_or(Value::is_null) {
        return SYNTHESIS;
    }
    match confidence(state) {
        Some(c) if c >= confidence_threshold => SYNTHESIS,
        Some(_) => VALIDATOR,
        None => {
            warn!("confidenceScore is missing or out of range; validating");
            VALIDATOR
        }
    }
}

/// After validation: insufficient with attempts left → research again,
/// everything else → synthesis.
pub fn route_after_validation(state: &Value, max_research_attempts: u32) -> &'static str {
    if has_error(state) {
        return ERROR_RECOVERY;
    }

    let result = state.get(keys::VALIDATION_RESULT).and_then(Value::as_str);
    if result == Some("pending") {
        return SYNTHESIS;
    }
    let Some(done) = attempts(state, keys::RESEARCH_ATTEMPTS) else {
        warn!("researchAttempts is malformed; synthesizing");
        return SYNTHESIS;
    };

    match result {
        Some("insufficient") if done < u64::from(max_research_attempts) => RESEARCH,
        Some("insufficient") => {
            warn!(attempts = done, max = max_research_attempts, "research attempts exhausted; synthesizing what we have");
            SYNTHESIS
        }
        Some("sufficient") => SYNTHESIS,
        other => {
            warn!(result = ?other, "unexpected validation result; synthesizing");
            SYNTHESIS
        }
    }
}

/// After synthesis the turn is over.
pub fn route_after_synthesis(state: &Value) -> &'static str {
    if has_error(state) {
        return ERROR_RECOVERY;
    }
    END
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clarity_routes() {
        let ask = json!({"clarityStatus": "needs_clarification", "clarificationAttempts": 1});
        assert_eq!(route_after_clarity(&ask, 2), CLARIFICATION);

        let last = json!({"clarityStatus": "needs_clarification", "clarificationAttempts": 2});
        assert_eq!(route_after_clarity(&last, 2), CLARIFICATION);

        let exhausted = json!({"clarityStatus": "needs_clarification", "clarificationAttempts": 3});
        assert_eq!(route_after_clarity(&exhausted, 2), RESEARCH);

        let malformed = json!({"clarityStatus": "needs_clarification", "clarificationAttempts": "two"});
        assert_eq!(route_after_clarity(&malformed, 2), RESEARCH);

        let clear = json!({"clarityStatus": "clear", "detectedEntity": "Apple Inc."});
        assert_eq!(route_after_clarity(&clear, 2), RESEARCH);

        let clear_no_entity = json!({"clarityStatus": "clear", "detectedEntity": null});
        assert_eq!(route_after_clarity(&clear_no_entity, 2), RESEARCH);
    }

    #[test]
    fn clarity_cancel_ends_turn() {
        let cancelled = json!({
            "clarityStatus": "needs_clarification",
            "clarificationAttempts": 1,
            "finalOutput": "Okay, cancelled."
        });
        assert_eq!(route_after_clarity(&cancelled, 2), END);
    }

    #[test]
    fn research_routes() {
        let confident = json!({"findings": {"subject": "Apple Inc."}, "confidenceScore": 9});
        assert_eq!(route_after_research(&confident, 7.0), SYNTHESIS);

        let at_threshold = json!({"findings": {"subject": "Apple Inc."}, "confidenceScore": 7.0});
        assert_eq!(route_after_research(&at_threshold, 7.0), SYNTHESIS);

        let weak = json!({"findings": {"subject": "Apple Inc."}, "confidenceScore": 4.5});
        assert_eq!(route_after_research(&weak, 7.0), VALIDATOR);

        let nothing = json!({"findings": null, "confidenceScore": 0});
        assert_eq!(route_after_research(&nothing, 7.0), SYNTHESIS);

        for bad in [json!("high"), json!(11), json!(-1), Value::Null] {
            let state = json!({"findings": {"subject": "x"}, "confidenceScore": bad});
            assert_eq!(route_after_research(&state, 7.0), VALIDATOR);
        }
    }

    #[test]
    fn validation_routes() {
        let retry = json!({"validationResult": "insufficient", "researchAttempts": 2});
        assert_eq!(route_after_validation(&retry, 3), RESEARCH);

        let exhausted = json!({"validationResult": "insufficient", "researchAttempts": 3});
        assert_eq!(route_after_validation(&exhausted, 3), SYNTHESIS);

        let ok = json!({"validationResult": "sufficient", "researchAttempts": 1});
        assert_eq!(route_after_validation(&ok, 3), SYNTHESIS);

        let pending = json!({"validationResult": "pending", "researchAttempts": 1});
        assert_eq!(route_after_validation(&pending, 3), SYNTHESIS);

        let negative = json!({"validationResult": "insufficient", "researchAttempts": -1});
        assert_eq!(route_after_validation(&negative, 3), SYNTHESIS);

        let fractional = json!({"validationResult": "insufficient", "researchAttempts": 1.5});
        assert_eq!(route_after_validation(&fractional, 3), SYNTHESIS);
    }

    #[test]
    fn synthesis_routes() {
        assert_eq!(route_after_synthesis(&json!({"finalOutput": "done"})), END);
        let failed = json!({"errorContext": {"failedStage": "synthesis", "message": "x", "retryable": false}});
        assert_eq!(route_after_synthesis(&failed), ERROR_RECOVERY);
    }

    #[test]
    fn error_context_takes_precedence_everywhere() {
        let state = json!({
            "errorContext": {"failedStage": "research", "message": "503", "retryable": true},
            "clarityStatus": "needs_clarification",
            "clarificationAttempts": 1,
            "findings": {"subject": "x"},
            "confidenceScore": 10,
            "validationResult": "insufficient",
            "researchAttempts": 1,
            "finalOutput": "something"
        });
        assert_eq!(route_after_clarity(&state, 2), ERROR_RECOVERY);
        assert_eq!(route_after_research(&state, 7.0), ERROR_RECOVERY);
        assert_eq!(route_after_validation(&state, 3), ERROR_RECOVERY);
        assert_eq!(route_after_synthesis(&state), ERROR_RECOVERY);
    }
}
