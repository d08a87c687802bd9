use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use dossier_core::error::{ResearchError, Result};

use crate::client::ResearchClient;
use crate::types::{Findings, ResearchOutcome, SearchContext};

type Scripted = std::result::Result<ResearchOutcome, ResearchError>;

/// Mock provider for testing without HTTP.
///
/// Scripted results are returned in order; once they run out every call
/// gets the fallback.
pub struct MockResearchClient {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    calls: Mutex<Vec<(String, SearchContext)>>,
}

impl MockResearchClient {
    pub fn scripted(script: Vec<Scripted>, fallback: Scripted) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always returns `outcome`.
    pub fn always(outcome: ResearchOutcome) -> Self {
        Self::scripted(Vec::new(), Ok(outcome))
    }

    /// Always returns findings about `subject` with the given confidence.
    pub fn found(subject: impl Into<String>, confidence_score: f64) -> Self {
        Self::always(outcome_for(subject, confidence_score))
    }

    /// Always fails with `fault`.
    pub fn failing(fault: ResearchError) -> Self {
        Self::scripted(Vec::new(), Err(fault))
    }

    /// Entities and contexts of every search, in order.
    pub fn calls(&self) -> Vec<(String, SearchContext)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A fully populated outcome about `subject`.
pub fn outcome_for(subject: impl Into<String>, confidence_score: f64) -> ResearchOutcome {
    let subject = subject.into();
    ResearchOutcome {
        findings: Some(Findings {
            overview: Some(format!("{subject} is a company.")),
            financials: Some(format!("{subject} reports steady revenue.")),
            recent_news: Some(format!("{subject} announced a new product.")),
            sources: vec!["https://example.com/profile".into()],
            raw: format!("Profile of {subject}"),
            subject,
        }),
        confidence_score,
        source_name: "mock".into(),
    }
}

#[async_trait]
impl ResearchClient for MockResearchClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, entity: &str, context: &SearchContext) -> Result<ResearchOutcome> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((entity.to_string(), context.clone()));
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map_err(Into::into)
    }
}
