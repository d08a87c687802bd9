pub mod mock;
pub mod openai;
pub(crate) mod transport;

pub mod prelude {
    pub use crate::mock::{MockOracle, OracleCall};
    pub use crate::openai::OpenAIOracle;
}
