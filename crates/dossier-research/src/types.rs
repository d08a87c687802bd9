use serde::{Deserialize, Serialize};

/// What a research provider found about one company.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Findings {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_news: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    /// Provider's unprocessed text, kept for synthesis prompts.
    #[serde(default)]
    pub raw: String,
}

impl Findings {
    /// Names of the sections that carry no content.
    pub fn missing_sections(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.overview) {
            missing.push("overview");
        }
        if is_blank(&self.financials) {
            missing.push("financials");
        }
        if is_blank(&self.recent_news) {
            missing.push("recentNews");
        }
        missing
    }
}

fn is_blank(section: &Option<String>) -> bool {
    section.as_deref().is_none_or(|s| s.trim().is_empty())
}

/// Context passed along with a search so providers can refine retries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchContext {
    pub original_query: String,
    #[serde(default)]
    pub prior_feedback: Option<String>,
    /// 1-based number of this attempt within the current turn.
    pub attempt_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchOutcome {
    pub findings: Option<Findings>,
    /// Provider confidence in [0, 10].
    pub confidence_score: f64,
    pub source_name: String,
}

impl ResearchOutcome {
    pub fn not_found(source_name: impl Into<String>) -> Self {
        Self {
            findings: None,
            confidence_score: 0.0,
            source_name: source_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn findings_serialize_camel_case() {
        let f = Findings {
            subject: "Apple Inc.".into(),
            recent_news: Some("New product launch".into()),
            ..Default::default()
        };
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["recentNews"], "New product launch");
        assert!(v.get("overview").is_none());
        assert_eq!(v["sources"], json!([]));
    }

    #[test]
    fn missing_sections_ignores_blank_text() {
        let f = Findings {
            subject: "Acme".into(),
            overview: Some("Makes anvils".into()),
            financials: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(f.missing_sections(), vec!["financials", "recentNews"]);
    }

    #[test]
    fn outcome_deserializes_null_findings() {
        let o: ResearchOutcome = serde_json::from_value(json!({
            "findings": null,
            "confidenceScore": 0,
            "sourceName": "search"
        }))
        .unwrap();
        assert_eq!(o, ResearchOutcome::not_found("search"));
    }
}
