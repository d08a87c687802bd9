//! Deterministic oracle for tests and offline runs.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use dossier_core::error::{DossierError, OracleError, Result};
use dossier_core::oracle::{Oracle, StructuredOracle};

type TextFn = dyn Fn(&str, &str) -> Result<String> + Send + Sync;
type StructuredFn = dyn Fn(&str, &str, &Value) -> Result<Value> + Send + Sync;

/// A recorded oracle call.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleCall {
    pub system_prompt: String,
    pub user_prompt: String,
    pub structured: bool,
}

/// Closure-driven oracle. Built with `structured` it also answers
/// schema-constrained prompts; built with `text_only` it does not advertise
/// that capability.
pub struct MockOracle {
    name: String,
    text: Box<TextFn>,
    structured: Option<Box<StructuredFn>>,
    calls: Mutex<Vec<OracleCall>>,
}

impl MockOracle {
    /// An oracle that answers both plain and structured prompts. Plain
    /// prompts receive `text`'s answer.
    pub fn new<T, S>(text: T, structured: S) -> Self
    where
        T: Fn(&str, &str) -> Result<String> + Send + Sync + 'static,
        S: Fn(&str, &str, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: "mock-oracle".into(),
            text: Box::new(text),
            structured: Some(Box::new(structured)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A structured oracle whose plain prompts get an empty answer.
    pub fn structured<S>(structured: S) -> Self
    where
        S: Fn(&str, &str, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        let mut oracle = Self::text_only(|_, _| Ok(String::new()));
        oracle.structured = Some(Box::new(structured));
        oracle
    }

    /// An oracle without structured-output capability.
    pub fn text_only<T>(text: T) -> Self
    where
        T: Fn(&str, &str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name: "mock-text-oracle".into(),
            text: Box::new(text),
            structured: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// An oracle that fails every call with the error built by `make`.
    pub fn failing<E>(make: E) -> Self
    where
        E: Fn() -> DossierError + Send + Sync + 'static,
    {
        let make = std::sync::Arc::new(make);
        let make_structured = make.clone();
        Self::new(move |_, _| Err(make()), move |_, _, _| Err(make_structured()))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn calls(&self) -> Vec<OracleCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn record(&self, system_prompt: &str, user_prompt: &str, structured: bool) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(OracleCall {
                system_prompt: system_prompt.to_string(),
                user_prompt: user_prompt.to_string(),
                structured,
            });
    }
}

#[async_trait]
impl Oracle for MockOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.record(system_prompt, user_prompt, false);
        (self.text)(system_prompt, user_prompt)
    }

    fn as_structured(&self) -> Option<&dyn StructuredOracle> {
        self.structured.as_ref().map(|_| self as &dyn StructuredOracle)
    }
}

#[async_trait]
impl StructuredOracle for MockOracle {
    async fn invoke_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
    ) -> Result<Value> {
        self.record(system_prompt, user_prompt, true);
        match &self.structured {
            Some(f) => f(system_prompt, user_prompt, schema),
            None => Err(OracleError::StructuredUnsupported(self.name.clone()).into()),
        }
    }
}
