//! Offline research provider backed by a company catalog.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dossier_core::error::{DossierError, Result};

use crate::client::ResearchClient;
use crate::types::{Findings, ResearchOutcome, SearchContext};

const BUILTIN_CATALOG: &str = include_str!("../data/companies.yaml");

/// Legal-form suffixes ignored when matching names.
const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "incorporated", "corp", "corporation", "co", "company", "ltd", "limited", "llc",
    "plc", "ag", "sa", "com",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub financials: Option<String>,
    #[serde(default)]
    pub recent_news: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    companies: Vec<CompanyProfile>,
}

pub struct CatalogResearchClient {
    companies: Vec<CompanyProfile>,
}

impl CatalogResearchClient {
    pub fn new(companies: Vec<CompanyProfile>) -> Self {
        Self { companies }
    }

    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(text)
            .map_err(|e| DossierError::Config(format!("invalid company catalog: {e}")))?;
        Ok(Self::new(file.companies))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DossierError::Config(format!("failed to read catalog {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn companies(&self) -> &[CompanyProfile] {
        &self.companies
    }

    /// Find a company by name or alias, ignoring case, punctuation and
    /// legal-form suffixes.
    pub fn lookup(&self, entity: &str) -> Option<&CompanyProfile> {
        let wanted = normalize_name(entity);
        if wanted.is_empty() {
            return None;
        }
        self.companies.iter().find(|c| {
            normalize_name(&c.name) == wanted
                || c.aliases.iter().any(|a| normalize_name(a) == wanted)
        })
    }
}

/// Lowercase, strip punctuation and trailing legal-form suffixes.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    while words.len() > 1 && words.last().is_some_and(|w| LEGAL_SUFFIXES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}

/// Confidence from completeness: 4 for a match, 2 per filled section,
/// 0.5 per source up to 2 sources.
fn confidence(findings: &Findings) -> f64 {
    let sections = 3 - findings.missing_sections().len();
    let sources = findings.sources.len().min(2);
    (4.0 + 2.0 * sections as f64 + 0.5 * sources as f64).min(10.0)
}

fn to_findings(profile: &CompanyProfile) -> Findings {
    let mut raw = String::new();
    for (label, section) in [
        ("Overview", &profile.overview),
        ("Financials", &profile.financials),
        ("Recent news", &profile.recent_news),
    ] {
        if let Some(text) = section {
            raw.push_str(&format!("{label}: {}\n", text.trim()));
        }
    }
    Findings {
        subject: profile.name.clone(),
        overview: profile.overview.clone(),
        financials: profile.financials.clone(),
        recent_news: profile.recent_news.clone(),
        sources: profile.sources.clone(),
        raw,
    }
}

#[async_trait]
impl ResearchClient for CatalogResearchClient {
    fn name(&self) -> &str {
        "catalog"
    }

    async fn search(&self, entity: &str, context: &SearchContext) -> Result<ResearchOutcome> {
        let Some(profile) = self.lookup(entity) else {
            debug!(entity, "entity not in catalog");
            return Ok(ResearchOutcome::not_found(self.name()));
        };
        let findings = to_findings(profile);
        let confidence_score = confidence(&findings);
        debug!(
            entity,
            subject = %findings.subject,
            confidence = confidence_score,
            attempt = context.attempt_number,
            "catalog match"
        );
        Ok(ResearchOutcome {
            findings: Some(findings),
            confidence_score,
            source_name: self.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_parses() {
        let catalog = CatalogResearchClient::builtin().unwrap();
        assert!(catalog.companies().len() >= 5);
    }

    #[test]
    fn normalize_strips_suffixes_and_punctuation() {
        assert_eq!(normalize_name("Apple Inc."), "apple");
        assert_eq!(normalize_name("  Tesla, Inc. "), "tesla");
        assert_eq!(normalize_name("Amazon.com, Inc."), "amazon");
        assert_eq!(normalize_name("Microsoft Corporation"), "microsoft");
        // A lone suffix is kept rather than erased.
        assert_eq!(normalize_name("Co"), "co");
    }

    #[test]
    fn lookup_by_alias_and_name() {
        let catalog = CatalogResearchClient::builtin().unwrap();
        assert_eq!(catalog.lookup("AAPL").unwrap().name, "Apple Inc.");
        assert_eq!(catalog.lookup("apple inc").unwrap().name, "Apple Inc.");
        assert_eq!(catalog.lookup("Google").unwrap().name, "Alphabet Inc.");
        assert!(catalog.lookup("Initech").is_none());
        assert!(catalog.lookup("   ").is_none());
    }

    #[tokio::test]
    async fn complete_profile_scores_high() {
        let catalog = CatalogResearchClient::builtin().unwrap();
        let outcome = catalog
            .search("Apple Inc.", &SearchContext::default())
            .await
            .unwrap();
        let findings = outcome.findings.unwrap();
        assert_eq!(findings.subject, "Apple Inc.");
        assert!(findings.raw.contains("Overview:"));
        assert_eq!(outcome.confidence_score, 10.0);
    }

    #[tokio::test]
    async fn sparse_profile_scores_low() {
        let catalog = CatalogResearchClient::builtin().unwrap();
        let outcome = catalog
            .search("Acme Robotics", &SearchContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.confidence_score, 6.0);
    }

    #[tokio::test]
    async fn unknown_entity_has_no_findings() {
        let catalog = CatalogResearchClient::builtin().unwrap();
        let outcome = catalog
            .search("Initech", &SearchContext::default())
            .await
            .unwrap();
        assert!(outcome.findings.is_none());
        assert_eq!(outcome.confidence_score, 0.0);
    }

    #[test]
    fn invalid_yaml_is_config_error() {
        let err = CatalogResearchClient::from_yaml_str("companies: 12").err().unwrap();
        assert!(matches!(err, DossierError::Config(_)));
    }
}
