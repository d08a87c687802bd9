use async_trait::async_trait;

use dossier_core::error::Result;

use crate::types::{ResearchOutcome, SearchContext};

/// A research-data provider.
///
/// Failures should be `ResearchError`s carrying a retryable flag and, where
/// known, the HTTP status or socket error code.
#[async_trait]
pub trait ResearchClient: Send + Sync {
    fn name(&self) -> &str;

    /// Look up `entity`. A provider that knows nothing about it returns an
    /// outcome without findings rather than an error.
    async fn search(&self, entity: &str, context: &SearchContext) -> Result<ResearchOutcome>;
}
