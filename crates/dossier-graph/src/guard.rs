//! Error interception for graph stages.
//!
//! A guarded stage never fails: any error (including an elapsed invocation
//! deadline) is converted into an `errorContext` patch that the routers send
//! to error recovery.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::warn;

use dossier_core::config::RunConfig;
use dossier_core::error::{DossierError, Result};
use dossier_core::fault::classify;

use crate::node::NodeFn;

pub const ERROR_CONTEXT_KEY: &str = "errorContext";
pub const CURRENT_STAGE_KEY: &str = "currentStage";

/// Record of a failed stage, stored under `errorContext`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub failed_stage: String,
    pub message: String,
    pub retryable: bool,
}

impl ErrorContext {
    pub fn from_error(stage: &str, err: &DossierError) -> Self {
        Self {
            failed_stage: stage.to_string(),
            message: err.to_string(),
            retryable: classify(err),
        }
    }

    /// Read the error context from a state value. Anything other than a
    /// well-formed object (including `null`) yields `None`.
    pub fn from_state(state: &Value) -> Option<Self> {
        state
            .get(ERROR_CONTEXT_KEY)
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// True when the state carries any non-null `errorContext`, well-formed or not.
pub fn has_error(state: &Value) -> bool {
    state
        .get(ERROR_CONTEXT_KEY)
        .is_some_and(|v| !v.is_null())
}

/// Run `node` under the invocation deadline and intercept its failures.
pub(crate) async fn run_guarded(node: &NodeFn, state: Value, config: &RunConfig) -> Value {
    let stage = node.name().to_string();
    let started = Instant::now();

    let result: Result<Value> = match config.deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, node.invoke(state, config)).await {
            Ok(inner) => inner,
            Err(_) => Err(DossierError::Timeout {
                stage: stage.clone(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        },
        None => node.invoke(state, config).await,
    };

    match result {
        Ok(patch) => patch,
        Err(err) => {
            let context = ErrorContext::from_error(&stage, &err);
            warn!(
                stage = %stage,
                retryable = context.retryable,
                error = %err,
                "stage failed; routing to error recovery"
            );
            json!({
                ERROR_CONTEXT_KEY: context,
                CURRENT_STAGE_KEY: stage,
            })
        }
    }
}

/// Wrap a node so that it runs under the deadline and never fails.
pub fn guarded(node: NodeFn) -> NodeFn {
    let name = node.name().to_string();
    NodeFn::new(name, move |state: Value, config: RunConfig| {
        let node = node.clone();
        async move { Ok(run_guarded(&node, state, &config).await) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::error::{OracleError, ResearchError};
    use std::time::Duration;

    #[tokio::test]
    async fn passes_through_success() {
        let node = guarded(NodeFn::new("ok", |_s: Value, _c| async move {
            Ok(json!({"currentStage": "ok"}))
        }));
        let out = node.invoke(json!({}), &RunConfig::default()).await.unwrap();
        assert_eq!(out, json!({"currentStage": "ok"}));
    }

    #[tokio::test]
    async fn converts_error_to_context() {
        let node = guarded(NodeFn::new("research", |_s: Value, _c| async move {
            Err(ResearchError::new("upstream 503", true).with_status(503).into())
        }));
        let out = node.invoke(json!({}), &RunConfig::default()).await.unwrap();
        assert_eq!(out[CURRENT_STAGE_KEY], "research");
        let ctx = ErrorContext::from_state(&out).unwrap();
        assert_eq!(ctx.failed_stage, "research");
        assert!(ctx.retryable);
        assert!(ctx.message.contains("upstream 503"));
    }

    #[tokio::test]
    async fn auth_failure_not_retryable() {
        let node = guarded(NodeFn::new("clarity", |_s: Value, _c| async move {
            Err(OracleError::Auth("bad key".into()).into())
        }));
        let out = node.invoke(json!({}), &RunConfig::default()).await.unwrap();
        assert_eq!(out[ERROR_CONTEXT_KEY]["retryable"], false);
        assert_eq!(out[ERROR_CONTEXT_KEY]["failedStage"], "clarity");
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_retryable_timeout() {
        let node = guarded(NodeFn::new("slow", |_s: Value, _c| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        }));
        let config = RunConfig::default().with_timeout(Duration::from_secs(1));
        let out = node.invoke(json!({}), &config).await.unwrap();
        let ctx = ErrorContext::from_state(&out).unwrap();
        assert_eq!(ctx.failed_stage, "slow");
        assert!(ctx.retryable);
        assert!(ctx.message.contains("timed out"));
    }

    #[test]
    fn has_error_ignores_null() {
        assert!(!has_error(&json!({})));
        assert!(!has_error(&json!({"errorContext": null})));
        assert!(has_error(&json!({"errorContext": "garbage"})));
        assert!(ErrorContext::from_state(&json!({"errorContext": "garbage"})).is_none());
    }
}
