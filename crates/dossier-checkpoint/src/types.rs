use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The latest snapshot of one session's graph state.
///
/// Exactly one checkpoint exists per session; every completed stage
/// overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Session (thread) identifier.
    pub session_id: String,
    /// Number of stage executions recorded for this session.
    pub step: usize,
    /// Snapshot of all channel values (key → serialized channel state).
    pub channel_values: HashMap<String, Value>,
    /// Present while the session is parked at a suspending stage.
    pub suspended: Option<SuspendedTask>,
    pub metadata: CheckpointMetadata,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }
}

/// Marker describing a parked suspension: which stage is waiting and the
/// payload it presented to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendedTask {
    pub stage: String,
    pub payload: Value,
    pub suspended_at: DateTime<Utc>,
}

/// What produced a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    /// Turn input applied, before any stage ran.
    Input,
    /// A stage completed and its patch was merged.
    Loop,
    /// A suspending stage parked the session.
    Suspend,
    /// A suspended stage consumed its resume value.
    Resume,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub source: CheckpointSource,
    /// The stage that was just executed (if applicable).
    pub node_name: Option<String>,
    /// Correlates all checkpoints written by one engine invocation.
    pub run_id: String,
}

/// The outcome of one engine invocation.
#[derive(Debug, Clone)]
pub enum GraphOutput {
    /// The graph reached END; carries the final state.
    Complete(Value),
    /// A stage suspended execution to wait for external input.
    Suspended {
        stage: String,
        payload: Value,
        state: Value,
    },
}

impl GraphOutput {
    pub fn is_complete(&self) -> bool {
        matches!(self, GraphOutput::Complete(_))
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, GraphOutput::Suspended { .. })
    }

    /// The state at the point execution stopped.
    pub fn state(&self) -> &Value {
        match self {
            GraphOutput::Complete(v) => v,
            GraphOutput::Suspended { state, .. } => state,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            GraphOutput::Complete(v) => v,
            GraphOutput::Suspended { state, .. } => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Checkpoint {
        Checkpoint {
            session_id: "s-1".into(),
            step: 3,
            channel_values: HashMap::from([("originalQuery".into(), json!("Tell me about Apple"))]),
            suspended: Some(SuspendedTask {
                stage: "clarification".into(),
                payload: json!({"question": "Which company?"}),
                suspended_at: Utc::now(),
            }),
            metadata: CheckpointMetadata {
                source: CheckpointSource::Suspend,
                node_name: Some("clarification".into()),
                run_id: "run-1".into(),
            },
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn checkpoint_serde_roundtrip() {
        let cp = sample();
        let json = serde_json::to_string(&cp).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cp);
        assert!(back.is_suspended());
    }

    #[test]
    fn source_serializes_snake_case() {
        assert_eq!(serde_json::to_value(CheckpointSource::Resume).unwrap(), json!("resume"));
    }

    #[test]
    fn graph_output_accessors() {
        let done = GraphOutput::Complete(json!({"finalOutput": "ok"}));
        assert!(done.is_complete());
        assert_eq!(done.state()["finalOutput"], json!("ok"));

        let parked = GraphOutput::Suspended {
            stage: "clarification".into(),
            payload: json!({"question": "?"}),
            state: json!({"clarityStatus": "needs_clarification"}),
        };
        assert!(parked.is_suspended());
        assert_eq!(parked.into_value()["clarityStatus"], json!("needs_clarification"));
    }
}
