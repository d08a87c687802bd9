use async_trait::async_trait;
use serde_json::Value;

use crate::error::{OracleError, Result};

/// A language-model collaborator answering free-text prompts.
///
/// Stages consume oracles; routers never do.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Return the oracle's name (model identifier or mock label).
    fn name(&self) -> &str;

    /// Answer `user_prompt` under the instructions in `system_prompt`.
    async fn invoke(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Capability query for structured output. Oracles that can honour a JSON
    /// schema return themselves here.
    fn as_structured(&self) -> Option<&dyn StructuredOracle> {
        None
    }
}

/// An oracle that can return JSON conforming to a schema.
#[async_trait]
pub trait StructuredOracle: Oracle {
    async fn invoke_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
    ) -> Result<Value>;
}

/// Fail fast when a stage that needs structured output is given an oracle
/// without that capability.
pub fn require_structured(oracle: &dyn Oracle) -> Result<()> {
    match oracle.as_structured() {
        Some(_) => Ok(()),
        None => Err(OracleError::StructuredUnsupported(oracle.name().to_string()).into()),
    }
}

/// Call the structured capability, surfacing a typed error when it is absent.
pub async fn invoke_structured(
    oracle: &dyn Oracle,
    system_prompt: &str,
    user_prompt: &str,
    schema: &Value,
) -> Result<Value> {
    let structured = oracle
        .as_structured()
        .ok_or_else(|| OracleError::StructuredUnsupported(oracle.name().to_string()))?;
    structured
        .invoke_structured(system_prompt, user_prompt, schema)
        .await
}
