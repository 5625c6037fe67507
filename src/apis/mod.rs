pub mod crossref;
pub mod exa;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const UNKNOWN_AUTHOR: &str = "Unknown Author";
pub const UNKNOWN_JOURNAL: &str = "Unknown Journal";
pub const NO_IDENTIFIER: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Neural,
    Bibliographic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteratureRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub journal: String,
    pub year: i32,
    pub identifier: String,
    pub verified: bool,
    pub abstract_text: Option<String>,
    pub citation_count: Option<u32>,
    pub impact_factor: Option<f64>,
    pub source: Provider,
}

impl LiteratureRecord {
    /// True when the identifier carries anything beyond the "N/A" sentinel.
    pub fn has_identifier(&self) -> bool {
        let id = self.identifier.trim();
        !id.is_empty() && id != NO_IDENTIFIER
    }

    pub fn has_real_authors(&self) -> bool {
        self.authors
            .iter()
            .any(|a| !a.trim().is_empty() && a != UNKNOWN_AUTHOR)
    }

    pub fn has_real_journal(&self) -> bool {
        let journal = self.journal.trim();
        !journal.is_empty() && journal != UNKNOWN_JOURNAL
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(String),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<LiteratureRecord>, ProviderError>;
}

/// The authoritative metadata provider: free-text search plus title-targeted
/// search and direct identifier lookup, used for verification and backfill.
#[async_trait]
pub trait BibliographicSource: SearchProvider {
    async fn search_title(
        &self,
        title: &str,
        max_results: u32,
    ) -> Result<Vec<LiteratureRecord>, ProviderError>;

    /// Direct lookup by DOI. Returns `Ok(None)` when the registry has no
    /// entry for the identifier.
    async fn lookup(&self, identifier: &str) -> Result<Option<LiteratureRecord>, ProviderError>;
}

static DOI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"10\.\d{4,9}(?:\.\d+)*/[^\s<>"'?#&]+"#).expect("DOI regex is valid")
});

/// Extract a DOI embedded in a URL or free text.
pub fn extract_doi(text: &str) -> Option<String> {
    let m = DOI_RE.find(text)?;
    let doi = m.as_str().trim_end_matches(['.', ',', ';', ')']);
    if doi.is_empty() {
        return None;
    }
    Some(doi.to_string())
}

/// True when the identifier is a bare DOI, as opposed to a URL or a sentinel.
pub fn looks_like_doi(identifier: &str) -> bool {
    DOI_RE
        .find(identifier.trim())
        .map_or(false, |m| m.start() == 0)
}

// Approximate journal impact factors for venues that show up often enough to
// matter for ranking. Anything absent simply has no impact signal.
const JOURNAL_IMPACT: &[(&str, f64)] = &[
    ("nature", 50.5),
    ("science", 44.7),
    ("cell", 45.5),
    ("lancet", 98.4),
    ("the lancet", 98.4),
    ("new england journal of medicine", 96.2),
    ("jama", 63.1),
    ("nature medicine", 58.7),
    ("nature methods", 36.1),
    ("nature communications", 14.7),
    ("pnas", 9.4),
    ("proceedings of the national academy of sciences", 9.4),
    ("physical review letters", 8.1),
    ("journal of machine learning research", 4.3),
    ("ieee transactions on pattern analysis and machine intelligence", 20.8),
    ("scientific reports", 3.8),
    ("plos one", 2.9),
];

/// Impact factor for well-known venues, matched case-insensitively.
pub fn journal_impact_factor(journal: &str) -> Option<f64> {
    let name = journal.trim().to_lowercase();
    JOURNAL_IMPACT
        .iter()
        .find(|(j, _)| *j == name)
        .map(|(_, f)| *f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_doi_from_url() {
        assert_eq!(
            extract_doi("https://www.nature.com/articles/10.1038/s41586-024-07386-0"),
            Some("10.1038/s41586-024-07386-0".to_string())
        );
        assert_eq!(
            extract_doi("https://doi.org/10.1016/j.cell.2024.01.001?via=ihub"),
            Some("10.1016/j.cell.2024.01.001".to_string())
        );
    }

    #[test]
    fn test_extract_doi_trims_trailing_punctuation() {
        assert_eq!(
            extract_doi("see 10.1234/example."),
            Some("10.1234/example".to_string())
        );
    }

    #[test]
    fn test_extract_doi_absent() {
        assert_eq!(extract_doi("https://arxiv.org/abs/2106.04554"), None);
        assert_eq!(extract_doi(""), None);
    }

    #[test]
    fn test_looks_like_doi() {
        assert!(looks_like_doi("10.1038/s41586-024-07386-0"));
        assert!(looks_like_doi("  10.1234/example  "));
        assert!(!looks_like_doi("https://doi.org/10.1234/example"));
        assert!(!looks_like_doi(NO_IDENTIFIER));
        assert!(!looks_like_doi(""));
    }

    #[test]
    fn test_journal_impact_factor_lookup() {
        assert_eq!(journal_impact_factor("Nature"), Some(50.5));
        assert_eq!(journal_impact_factor("  the lancet "), Some(98.4));
        assert_eq!(journal_impact_factor("Journal of Obscure Results"), None);
        assert_eq!(journal_impact_factor(UNKNOWN_JOURNAL), None);
    }

    #[test]
    fn test_record_field_placeholders() {
        let record = LiteratureRecord {
            title: "T".into(),
            authors: vec![UNKNOWN_AUTHOR.into()],
            journal: UNKNOWN_JOURNAL.into(),
            year: 2024,
            identifier: NO_IDENTIFIER.into(),
            verified: false,
            abstract_text: None,
            citation_count: None,
            impact_factor: None,
            source: Provider::Neural,
        };
        assert!(!record.has_identifier());
        assert!(!record.has_real_authors());
        assert!(!record.has_real_journal());
    }
}
