//! The company-research workflow: state schema, stages, routers and the
//! `ResearchAgent` facade over the graph engine.

pub mod agent;
pub mod prompts;
pub mod routing;
pub mod stages;
pub mod state;
pub mod workflow;

pub mod prelude {
    pub use crate::agent::{ClarificationRequest, ResearchAgent, TurnOutcome};
    pub use crate::state::{ClarityStatus, ResearchState, ValidationResult};
    pub use crate::workflow::build_workflow;
}
