pub mod config;
pub mod error;
pub mod fault;
pub mod message;
pub mod oracle;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{RunConfig, WorkflowConfig};
    pub use crate::error::{
        DossierError, GraphError, OracleError, ResearchError, Result, SuspensionError,
    };
    pub use crate::fault::{classify, socket_error_code};
    pub use crate::message::{Message, Role};
    pub use crate::oracle::{Oracle, StructuredOracle};
}
