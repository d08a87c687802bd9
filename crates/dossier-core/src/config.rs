use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{DossierError, Result};

/// Per-invocation settings handed to every stage.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Session (thread) the invocation belongs to.
    pub session_id: Option<String>,

    /// Maximum number of stage executions in one invocation.
    pub recursion_limit: usize,

    /// Unique identifier for this run.
    pub run_id: Uuid,

    /// Wall-clock deadline shared by every guarded stage of the invocation.
    pub deadline: Option<Instant>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            recursion_limit: 25,
            run_id: Uuid::new_v4(),
            deadline: None,
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

fn default_max_research_attempts() -> u32 {
    3
}

fn default_max_clarification_attempts() -> u32 {
    2
}

fn default_confidence_threshold() -> f64 {
    7.0
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_recursion_limit() -> usize {
    25
}

/// Tunables for the research workflow's loops and deadlines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Research executions allowed per turn before validation gives up.
    #[serde(default = "default_max_research_attempts")]
    pub max_research_attempts: u32,

    /// Clarifying questions allowed per turn.
    #[serde(default = "default_max_clarification_attempts")]
    pub max_clarification_attempts: u32,

    /// Confidence (0–10) at or above which findings skip validation.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Overall wall-clock budget for one engine invocation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_research_attempts: default_max_research_attempts(),
            max_clarification_attempts: default_max_clarification_attempts(),
            confidence_threshold: default_confidence_threshold(),
            timeout_secs: default_timeout_secs(),
            recursion_limit: default_recursion_limit(),
        }
    }
}

impl WorkflowConfig {
    pub const ENV_MAX_RESEARCH_ATTEMPTS: &'static str = "DOSSIER_MAX_RESEARCH_ATTEMPTS";
    pub const ENV_MAX_CLARIFICATION_ATTEMPTS: &'static str = "DOSSIER_MAX_CLARIFICATION_ATTEMPTS";
    pub const ENV_CONFIDENCE_THRESHOLD: &'static str = "DOSSIER_CONFIDENCE_THRESHOLD";
    pub const ENV_TIMEOUT_SECS: &'static str = "DOSSIER_TIMEOUT_SECS";

    /// Defaults overridden by any `DOSSIER_*` environment variables present.
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env(|key| std::env::var(key).ok())
    }

    /// Load a YAML file. Missing keys fall back to defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DossierError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| DossierError::Config(format!("invalid YAML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn merge_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(Self::ENV_MAX_RESEARCH_ATTEMPTS) {
            self.max_research_attempts = parse_env(Self::ENV_MAX_RESEARCH_ATTEMPTS, &v)?;
        }
        if let Some(v) = lookup(Self::ENV_MAX_CLARIFICATION_ATTEMPTS) {
            self.max_clarification_attempts =
                parse_env(Self::ENV_MAX_CLARIFICATION_ATTEMPTS, &v)?;
        }
        if let Some(v) = lookup(Self::ENV_CONFIDENCE_THRESHOLD) {
            self.confidence_threshold = parse_env(Self::ENV_CONFIDENCE_THRESHOLD, &v)?;
        }
        if let Some(v) = lookup(Self::ENV_TIMEOUT_SECS) {
            self.timeout_secs = parse_env(Self::ENV_TIMEOUT_SECS, &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_research_attempts == 0 {
            return Err(DossierError::Config(
                "max_research_attempts must be at least 1".into(),
            ));
        }
        if self.max_clarification_attempts == 0 {
            return Err(DossierError::Config(
                "max_clarification_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=10.0).contains(&self.confidence_threshold) {
            return Err(DossierError::Config(format!(
                "confidence_threshold must be within [0, 10], got {}",
                self.confidence_threshold
            )));
        }
        if self.timeout_secs == 0 {
            return Err(DossierError::Config("timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DossierError::Config(format!("{key} has an invalid value: '{value}'")))
}
