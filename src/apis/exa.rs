use async_trait::async_trait;
use chrono::Datelike;
use serde::Deserialize;

use super::{
    extract_doi, journal_impact_factor, LiteratureRecord, Provider, ProviderError, SearchProvider,
    NO_IDENTIFIER, UNKNOWN_AUTHOR, UNKNOWN_JOURNAL,
};

const BASE_URL: &str = "https://api.exa.ai";
const SNIPPET_CHARS: u32 = 1000;
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct ExaClient {
    client: reqwest::Client,
    api_key: String,
}

impl ExaClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("cite-finder/0.1")
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap(),
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct ExaResponse {
    results: Option<Vec<ExaResult>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaResult {
    title: Option<String>,
    url: Option<String>,
    published_date: Option<String>,
    author: Option<String>,
    text: Option<String>,
}

// Hostnames that map to a recognizable venue name. Unlisted hosts fall back
// to the bare hostname.
const VENUE_DOMAINS: &[(&str, &str)] = &[
    ("arxiv.org", "arXiv"),
    ("biorxiv.org", "bioRxiv"),
    ("medrxiv.org", "medRxiv"),
    ("nature.com", "Nature"),
    ("science.org", "Science"),
    ("cell.com", "Cell"),
    ("thelancet.com", "The Lancet"),
    ("nejm.org", "New England Journal of Medicine"),
    ("sciencedirect.com", "ScienceDirect"),
    ("link.springer.com", "Springer"),
    ("springer.com", "Springer"),
    ("onlinelibrary.wiley.com", "Wiley"),
    ("wiley.com", "Wiley"),
    ("ieeexplore.ieee.org", "IEEE Xplore"),
    ("ieee.org", "IEEE Xplore"),
    ("dl.acm.org", "ACM Digital Library"),
    ("acm.org", "ACM Digital Library"),
    ("pubmed.ncbi.nlm.nih.gov", "PubMed"),
    ("ncbi.nlm.nih.gov", "PubMed Central"),
    ("aclanthology.org", "ACL Anthology"),
    ("openreview.net", "OpenReview"),
    ("semanticscholar.org", "Semantic Scholar"),
    ("ssrn.com", "SSRN"),
    ("mdpi.com", "MDPI"),
    ("frontiersin.org", "Frontiers"),
    ("plos.org", "PLOS"),
];

fn venue_for_url(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return UNKNOWN_JOURNAL.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return UNKNOWN_JOURNAL.to_string();
    };
    let host = host.strip_prefix("www.").unwrap_or(host);
    for (domain, venue) in VENUE_DOMAINS {
        if host == *domain || host.ends_with(&format!(".{}", domain)) {
            return venue.to_string();
        }
    }
    host.to_string()
}

fn split_authors(raw: &str) -> Vec<String> {
    let mut authors: Vec<String> = Vec::new();
    for part in raw.replace(" and ", ",").replace(';', ",").split(',') {
        let name = part.trim();
        if name.is_empty() || name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        authors.push(name.to_string());
    }
    if authors.is_empty() {
        authors.push(UNKNOWN_AUTHOR.to_string());
    }
    authors
}

fn published_year(date: Option<&str>) -> i32 {
    date.and_then(|d| d.get(..4))
        .and_then(|y| y.parse::<i32>().ok())
        .filter(|y| (1000..=9999).contains(y))
        .unwrap_or_else(|| chrono::Utc::now().year())
}

fn exa_to_record(result: &ExaResult) -> Option<LiteratureRecord> {
    let title = result.title.as_deref().unwrap_or("").trim().to_string();
    if title.is_empty() {
        return None;
    }
    let url = result.url.as_deref().unwrap_or("").trim();
    let journal = venue_for_url(url);
    let identifier = extract_doi(url).unwrap_or_else(|| {
        if url.is_empty() {
            NO_IDENTIFIER.to_string()
        } else {
            url.to_string()
        }
    });
    let authors = result
        .author
        .as_deref()
        .map(split_authors)
        .unwrap_or_else(|| vec![UNKNOWN_AUTHOR.to_string()]);
    let abstract_text = result
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);

    let impact_factor = journal_impact_factor(&journal);
    Some(LiteratureRecord {
        title,
        authors,
        journal,
        year: published_year(result.published_date.as_deref()),
        identifier,
        verified: false,
        abstract_text,
        citation_count: None,
        impact_factor,
        source: Provider::Neural,
    })
}

#[async_trait]
impl SearchProvider for ExaClient {
    fn name(&self) -> &str {
        "exa"
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<LiteratureRecord>, ProviderError> {
        let body = serde_json::json!({
            "query": query,
            "numResults": max_results.min(100),
            "type": "auto",
            "contents": { "text": { "maxCharacters": SNIPPET_CHARS } },
        });
        let resp = self
            .client
            .post(format!("{}/search", BASE_URL))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!(
                "exa returned {}: {}",
                status, text
            )));
        }
        let parsed: ExaResponse = resp.json().await?;
        Ok(parsed
            .results
            .unwrap_or_default()
            .iter()
            .filter_map(exa_to_record)
            .collect())
    }
}
