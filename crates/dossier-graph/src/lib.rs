pub mod channel;
pub mod compiled;
pub mod constants;
pub mod edge;
pub mod guard;
pub mod node;
pub mod runner;
pub mod session;
pub mod state_graph;
pub mod suspend;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::channel::{ChannelSpec, Retention};
    pub use crate::compiled::CompiledStateGraph;
    pub use crate::constants::{END, START};
    pub use crate::edge::ConditionalEdge;
    pub use crate::guard::{guarded, has_error, ErrorContext, CURRENT_STAGE_KEY, ERROR_CONTEXT_KEY};
    pub use crate::node::NodeFn;
    pub use crate::runner::GraphRunner;
    pub use crate::state_graph::StateGraph;
    pub use crate::suspend::{Prepared, SuspendingNode};
    pub use dossier_checkpoint::types::GraphOutput;
}
