pub mod catalog;
pub mod client;
pub mod http;
pub mod mock;
pub mod types;

pub mod prelude {
    pub use crate::catalog::{CatalogResearchClient, CompanyProfile};
    pub use crate::client::ResearchClient;
    pub use crate::http::HttpResearchClient;
    pub use crate::mock::MockResearchClient;
    pub use crate::types::{Findings, ResearchOutcome, SearchContext};
}
