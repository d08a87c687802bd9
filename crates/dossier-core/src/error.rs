use thiserror::Error;

/// Top-level error type for the dossier workspace.
#[derive(Debug, Error)]
pub enum DossierError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Research error: {0}")]
    Research(#[from] ResearchError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Suspension error: {0}")]
    Suspension(#[from] SuspensionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stage '{stage}' timed out after {elapsed_ms}ms")]
    Timeout { stage: String, elapsed_ms: u64 },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum OracleError {
    /// The request failed. `status` is the HTTP status when a response was
    /// received; `code` is an OS-level socket error name such as `ECONNRESET`.
    #[error("request failed: {message}")]
    Request {
        message: String,
        status: Option<u16>,
        code: Option<String>,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("oracle '{0}' does not support structured output")]
    StructuredUnsupported(String),
}

impl OracleError {
    pub fn request(message: impl Into<String>) -> Self {
        OracleError::Request {
            message: message.into(),
            status: None,
            code: None,
        }
    }
}

/// A classified fault raised by a research-data provider.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ResearchError {
    pub message: String,
    pub retryable: bool,
    pub status: Option<u16>,
    pub code: Option<String>,
}

impl ResearchError {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            retryable,
            status: None,
            code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Recursion limit ({limit}) exceeded")]
    RecursionLimit { limit: usize },

    #[error("Node error in '{node}': {source}")]
    NodeExecution {
        node: String,
        source: Box<DossierError>,
    },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Another writer changed the session's checkpoint mid-run.
    #[error("session '{session_id}' was changed by another writer")]
    Conflict { session_id: String },
}

/// Caller errors in the suspend/resume protocol.
#[derive(Debug, Error)]
pub enum SuspensionError {
    #[error("session '{session_id}' has no pending suspension to resume")]
    NoPendingSuspension { session_id: String },

    #[error("session '{session_id}' is suspended at '{stage}'; resume it before starting a new turn")]
    Pending { session_id: String, stage: String },

    #[error("invalid resume value for '{stage}': {reason}")]
    InvalidResumeValue { stage: String, reason: String },

    #[error("suspended stage '{0}' is not a suspending node of this graph")]
    UnknownStage(String),
}

pub type Result<T> = std::result::Result<T, DossierError>;
