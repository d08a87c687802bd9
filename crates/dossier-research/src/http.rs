//! Research provider reached over HTTP.
//!
//! The endpoint receives `POST {base_url}/search` with a JSON body of
//! `{entity, originalQuery, priorFeedback, attemptNumber}` and answers with a
//! `ResearchOutcome` in camelCase JSON.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use dossier_core::error::{DossierError, ResearchError, Result};
use dossier_core::fault::socket_error_code;

use crate::client::ResearchClient;
use crate::types::{ResearchOutcome, SearchContext};

pub const ENV_SEARCH_URL: &str = "DOSSIER_SEARCH_URL";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    entity: &'a str,
    original_query: &'a str,
    prior_feedback: Option<&'a str>,
    attempt_number: u32,
}

pub struct HttpResearchClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpResearchClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DossierError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build from `DOSSIER_SEARCH_URL`; `None` when it is unset.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(ENV_SEARCH_URL) {
            Ok(url) if !url.trim().is_empty() => Self::new(url).map(Some),
            _ => Ok(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn transport_fault(err: reqwest::Error) -> ResearchError {
    let code = socket_error_code(&err)
        .or_else(|| err.is_timeout().then_some("ETIMEDOUT"))
        .or_else(|| err.is_connect().then_some("ECONNREFUSED"));
    let retryable = code.is_some() || err.is_timeout() || err.is_connect();
    let fault = ResearchError::new(format!("search request failed: {err}"), retryable);
    match code {
        Some(code) => fault.with_code(code),
        None => fault,
    }
}

fn status_fault(status: u16, body: &str) -> ResearchError {
    let retryable = matches!(status, 408 | 425 | 429) || (500..600).contains(&status);
    let snippet: String = body.chars().take(200).collect();
    ResearchError::new(format!("search provider returned HTTP {status}: {snippet}"), retryable)
        .with_status(status)
}

#[async_trait]
impl ResearchClient for HttpResearchClient {
    fn name(&self) -> &str {
        "http-search"
    }

    async fn search(&self, entity: &str, context: &SearchContext) -> Result<ResearchOutcome> {
        let request = SearchRequest {
            entity,
            original_query: &context.original_query,
            prior_feedback: context.prior_feedback.as_deref(),
            attempt_number: context.attempt_number,
        };
        debug!(entity, attempt = context.attempt_number, "search request");

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(transport_fault)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(entity, status = status.as_u16(), "search provider error");
            return Err(status_fault(status.as_u16(), &body).into());
        }

        let outcome: ResearchOutcome = response.json().await.map_err(|e| {
            ResearchError::new(format!("invalid search response: {e}"), false)
        })?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::fault::classify;

    #[test]
    fn request_body_shape() {
        let req = SearchRequest {
            entity: "Apple Inc.",
            original_query: "Tell me about Apple",
            prior_feedback: Some("missing financials"),
            attempt_number: 2,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["originalQuery"], "Tell me about Apple");
        assert_eq!(v["priorFeedback"], "missing financials");
        assert_eq!(v["attemptNumber"], 2);
    }

    #[test]
    fn status_faults_carry_status() {
        let fault = status_fault(503, "upstream overloaded");
        assert!(fault.retryable);
        assert_eq!(fault.status, Some(503));
        assert!(classify(&fault.into()));

        let fault = status_fault(404, "no such route");
        assert!(!fault.retryable);
        assert!(!classify(&fault.into()));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let client = HttpResearchClient::new("http://localhost:4000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:4000");
    }

    #[tokio::test]
    async fn refused_connection_is_retryable() {
        let client =
            HttpResearchClient::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client
            .search("Apple Inc.", &SearchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DossierError::Research(_)));
        assert!(classify(&err));
    }
}
