use async_trait::async_trait;
use chrono::Datelike;
use serde::Deserialize;

use super::{
    journal_impact_factor, BibliographicSource, LiteratureRecord, Provider, ProviderError,
    SearchProvider, NO_IDENTIFIER, UNKNOWN_AUTHOR, UNKNOWN_JOURNAL,
};

const BASE_URL: &str = "https://api.crossref.org/works";
const SELECT_FIELDS: &str = "DOI,title,author,container-title,abstract,published,published-print,published-online,is-referenced-by-count";
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct CrossRefClient {
    client: reqwest::Client,
}

impl CrossRefClient {
    pub fn new(mailto: Option<String>) -> Self {
        let user_agent = match mailto {
            Some(email) => format!("cite-finder/0.1 (mailto:{})", email),
            None => "cite-finder/0.1".to_string(),
        };
        Self {
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap(),
        }
    }

    async fn query_works(
        &self,
        param: &str,
        value: &str,
        max_results: u32,
    ) -> Result<Vec<LiteratureRecord>, ProviderError> {
        let rows = max_results.min(100).to_string();
        let resp = self
            .client
            .get(BASE_URL)
            .query(&[
                (param, value),
                ("rows", rows.as_str()),
                ("select", SELECT_FIELDS),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Api(format!(
                "crossref returned {}",
                resp.status()
            )));
        }
        let cr: CRResponse = resp.json().await?;
        Ok(cr
            .message
            .items
            .unwrap_or_default()
            .iter()
            .filter_map(item_to_record)
            .collect())
    }
}

#[derive(Deserialize)]
struct CRResponse {
    message: CRMessage,
}
#[derive(Deserialize)]
struct CRMessage {
    items: Option<Vec<CRItem>>,
    // Single work lookups return the work fields inline.
    #[serde(rename = "DOI")]
    doi: Option<String>,
    title: Option<Vec<String>>,
    author: Option<Vec<CRAuthor>>,
    #[serde(rename = "container-title")]
    container_title: Option<Vec<String>>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "is-referenced-by-count")]
    citation_count: Option<u32>,
    published: Option<CRDate>,
    #[serde(rename = "published-print")]
    published_print: Option<CRDate>,
    #[serde(rename = "published-online")]
    published_online: Option<CRDate>,
}
#[derive(Deserialize)]
struct CRItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    title: Option<Vec<String>>,
    author: Option<Vec<CRAuthor>>,
    #[serde(rename = "container-title")]
    container_title: Option<Vec<String>>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "is-referenced-by-count")]
    citation_count: Option<u32>,
    published: Option<CRDate>,
    #[serde(rename = "published-print")]
    published_print: Option<CRDate>,
    #[serde(rename = "published-online")]
    published_online: Option<CRDate>,
}
#[derive(Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
}
#[derive(Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts")]
    date_parts: Option<Vec<Vec<i32>>>,
}

fn date_year(date: Option<&CRDate>) -> Option<i32> {
    date?.date_parts.as_ref()?.first()?.first().copied()
}

// CrossRef abstracts come wrapped in JATS markup; drop the tags and collapse
// the remaining whitespace.
fn strip_jats(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn item_to_record(item: &CRItem) -> Option<LiteratureRecord> {
    let title = item
        .title
        .as_ref()
        .and_then(|t| t.first())
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    if title.is_empty() {
        return None;
    }

    let mut authors: Vec<String> = item
        .author
        .as_ref()
        .map(|list| {
            list.iter()
                .map(|a| {
                    format!(
                        "{} {}",
                        a.given.as_deref().unwrap_or(""),
                        a.family.as_deref().unwrap_or("")
                    )
                    .trim()
                    .to_string()
                })
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if authors.is_empty() {
        authors.push(UNKNOWN_AUTHOR.to_string());
    }

    let journal = item
        .container_title
        .as_ref()
        .and_then(|c| c.first())
        .map(|j| j.trim().to_string())
        .filter(|j| !j.is_empty())
        .unwrap_or_else(|| UNKNOWN_JOURNAL.to_string());

    let year = [&item.published, &item.published_print, &item.published_online]
        .into_iter()
        .find_map(|d| date_year(d.as_ref()).filter(|y| (1000..=9999).contains(y)))
        .unwrap_or_else(|| chrono::Utc::now().year());

    let identifier = item
        .doi
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .unwrap_or_else(|| NO_IDENTIFIER.to_string());

    let abstract_text = item
        .abstract_text
        .as_deref()
        .map(strip_jats)
        .filter(|a| !a.is_empty());

    let impact_factor = journal_impact_factor(&journal);
    Some(LiteratureRecord {
        title,
        authors,
        journal,
        year,
        identifier,
        verified: true,
        abstract_text,
        citation_count: item.citation_count,
        impact_factor,
        source: Provider::Bibliographic,
    })
}

#[async_trait]
impl SearchProvider for CrossRefClient {
    fn name(&self) -> &str {
        "crossref"
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<LiteratureRecord>, ProviderError> {
        self.query_works("query.bibliographic", query, max_results)
            .await
    }
}

#[async_trait]
impl BibliographicSource for CrossRefClient {
    async fn search_title(
        &self,
        title: &str,
        max_results: u32,
    ) -> Result<Vec<LiteratureRecord>, ProviderError> {
        self.query_works("query.title", title, max_results).await
    }

    async fn lookup(&self, identifier: &str) -> Result<Option<LiteratureRecord>, ProviderError> {
        let doi = identifier.trim();
        let doi = doi.strip_prefix("doi:").unwrap_or(doi);
        let url = format!("{}/{}", BASE_URL, doi);
        let resp = self.client.get(&url).send().await?;
        if resp.status() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(ProviderError::Api(format!(
                "crossref returned {}",
                resp.status()
            )));
        }
        let cr: CRResponse = resp.json().await?;
        let m = cr.message;
        let item = CRItem {
            doi: m.doi,
            title: m.title,
            author: m.author,
            container_title: m.container_title,
            abstract_text: m.abstract_text,
            citation_count: m.citation_count,
            published: m.published,
            published_print: m.published_print,
            published_online: m.published_online,
        };
        Ok(item_to_record(&item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ITEM: &str = r#"{
        "DOI": "10.1038/s41591-023-02448-8",
        "title": ["Large language models in medicine"],
        "author": [
            {"given": "Arun James", "family": "Thirunavukarasu"},
            {"given": "Darren Shu Jeng", "family": "Ting"}
        ],
        "container-title": ["Nature Medicine"],
        "abstract": "<jats:p>Large language models (LLMs) can respond to free-text queries.</jats:p>",
        "is-referenced-by-count": 1873,
        "published": {"date-parts": [[2023, 7, 17]]}
    }"#;

    #[test]
    fn test_item_to_record() {
        let item: CRItem = serde_json::from_str(SAMPLE_ITEM).unwrap();
        let record = item_to_record(&item).unwrap();
        assert_eq!(record.title, "Large language models in medicine");
        assert_eq!(
            record.authors,
            vec!["Arun James Thirunavukarasu", "Darren Shu Jeng Ting"]
        );
        assert_eq!(record.journal, "Nature Medicine");
        assert_eq!(record.year, 2023);
        assert_eq!(record.identifier, "10.1038/s41591-023-02448-8");
        assert!(record.verified);
        assert_eq!(record.source, Provider::Bibliographic);
        assert_eq!(record.citation_count, Some(1873));
        assert_eq!(record.impact_factor, Some(58.7));
        assert_eq!(
            record.abstract_text.as_deref(),
            Some("Large language models (LLMs) can respond to free-text queries.")
        );
    }

    #[test]
    fn test_item_without_title_is_dropped() {
        let item: CRItem = serde_json::from_str(r#"{"DOI": "10.1234/x"}"#).unwrap();
        assert!(item_to_record(&item).is_none());
    }

    #[test]
    fn test_item_defaults() {
        let item: CRItem =
            serde_json::from_str(r#"{"title": ["Untracked workshop paper"]}"#).unwrap();
        let record = item_to_record(&item).unwrap();
        assert_eq!(record.authors, vec![UNKNOWN_AUTHOR]);
        assert_eq!(record.journal, UNKNOWN_JOURNAL);
        assert_eq!(record.identifier, NO_IDENTIFIER);
        assert_eq!(record.year, chrono::Utc::now().year());
        assert_eq!(record.citation_count, None);
        assert_eq!(record.impact_factor, None);
    }

    #[test]
    fn test_year_prefers_published_then_print() {
        let item: CRItem = serde_json::from_str(
            r#"{
                "title": ["T"],
                "published-print": {"date-parts": [[2018, 1]]},
                "published-online": {"date-parts": [[2017, 11]]}
            }"#,
        )
        .unwrap();
        assert_eq!(item_to_record(&item).unwrap().year, 2018);

        let item: CRItem = serde_json::from_str(
            r#"{
                "title": ["T"],
                "published": {"date-parts": [[2019]]},
                "published-print": {"date-parts": [[2018]]}
            }"#,
        )
        .unwrap();
        assert_eq!(item_to_record(&item).unwrap().year, 2019);
    }

    #[test]
    fn test_implausible_year_falls_back() {
        // The registry emits zero or nonsense date-parts for malformed
        // deposits; those must not leak through as a record year.
        for date in ["[[0]]", "[[-2147483648]]", "[[10000]]"] {
            let item: CRItem = serde_json::from_str(&format!(
                r#"{{"title": ["T"], "published": {{"date-parts": {}}}}}"#,
                date
            ))
            .unwrap();
            assert_eq!(item_to_record(&item).unwrap().year, chrono::Utc::now().year());
        }

        // A junk published date still yields to a plausible print date.
        let item: CRItem = serde_json::from_str(
            r#"{
                "title": ["T"],
                "published": {"date-parts": [[0]]},
                "published-print": {"date-parts": [[2015]]}
            }"#,
        )
        .unwrap();
        assert_eq!(item_to_record(&item).unwrap().year, 2015);
    }

    #[test]
    fn test_strip_jats() {
        assert_eq!(
            strip_jats("<jats:p>Deep   learning\n tools.</jats:p>"),
            "Deep learning tools."
        );
        assert_eq!(strip_jats("plain text"), "plain text");
        assert_eq!(strip_jats("<jats:p></jats:p>"), "");
    }
}
