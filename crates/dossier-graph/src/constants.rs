//! Reserved node names. Neither may be used for a real stage.

/// Source of the edge that selects the entry stage.
pub const START: &str = "__start__";

/// Route target that ends the invocation.
pub const END: &str = "__end__";
