//! Catalog loading from disk and name-normalization properties.

use std::io::Write;

use proptest::prelude::*;

use dossier_research::catalog::normalize_name;
use dossier_research::prelude::*;

#[tokio::test]
async fn catalog_loads_from_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"companies:
  - name: Initech Corporation
    aliases: [initech]
    overview: Enterprise software vendor.
    financials: Profitable.
    sources: ["https://initech.example/about"]
"#
    )
    .unwrap();

    let client = CatalogResearchClient::from_yaml_file(file.path()).unwrap();
    let outcome = client
        .search(
            "Initech",
            &SearchContext {
                original_query: "Tell me about Initech".into(),
                prior_feedback: None,
                attempt_number: 1,
            },
        )
        .await
        .unwrap();

    let findings = outcome.findings.unwrap();
    assert_eq!(findings.subject, "Initech Corporation");
    assert_eq!(findings.missing_sections(), vec!["recentNews"]);
    assert_eq!(outcome.confidence_score, 8.5);
}

#[test]
fn missing_catalog_file_is_error() {
    assert!(CatalogResearchClient::from_yaml_file("/nonexistent/companies.yaml").is_err());
}

proptest! {
    #[test]
    fn normalize_is_idempotent(name in "[A-Za-z ,.&-]{0,40}") {
        let once = normalize_name(&name);
        prop_assert_eq!(normalize_name(&once), once);
    }

    #[test]
    fn catalog_confidence_in_range(name in "[A-Za-z ]{0,20}") {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let outcome = rt
            .block_on(CatalogResearchClient::builtin().unwrap().search(&name, &SearchContext::default()))
            .unwrap();
        prop_assert!((0.0..=10.0).contains(&outcome.confidence_score));
    }
}
