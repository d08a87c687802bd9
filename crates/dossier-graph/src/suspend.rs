//! Suspending nodes: stages that may park a session to wait for input.
//!
//! A suspending node is split in two. `prepare` is the idempotent prefix:
//! it is synchronous and sees only the state, so it cannot perform I/O and
//! yields the same payload every time it runs on the same state. `resume`
//! is the suffix that consumes the externally supplied value. On resume the
//! engine replays `prepare` and feeds the value to `resume` where the first
//! execution parked.

use async_trait::async_trait;
use serde_json::Value;

use dossier_core::config::RunConfig;
use dossier_core::error::Result;

/// Result of a suspending node's idempotent prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum Prepared {
    /// Park the session and present this payload to the caller.
    Suspend(Value),
    /// Nothing to ask; merge this patch and continue.
    Proceed(Value),
}

#[async_trait]
pub trait SuspendingNode: Send + Sync {
    fn name(&self) -> &str;

    /// Build the suspension payload from the current state.
    fn prepare(&self, state: &Value) -> Result<Prepared>;

    /// Reject resume values this node cannot consume. Called before any
    /// state is touched, so a rejected value leaves the suspension intact.
    fn validate_resume(&self, _value: &Value) -> Result<()> {
        Ok(())
    }

    /// Consume the resume value and return a partial state patch.
    async fn resume(&self, state: &Value, value: Value, config: &RunConfig) -> Result<Value>;
}
