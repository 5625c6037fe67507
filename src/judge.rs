use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Datelike;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::apis::LiteratureRecord;
use crate::dedup::canonical_key;

const LLM_TIMEOUT_SECS: u64 = 20;
const MAX_SCORE: f64 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAspect {
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub relevance: ScoredAspect,
    pub credibility: ScoredAspect,
    pub impact: ScoredAspect,
    pub advantages: Vec<String>,
    pub limitations: Vec<String>,
}

impl Evaluation {
    fn clamped(mut self) -> Self {
        self.relevance.score = clamp_score(self.relevance.score);
        self.credibility.score = clamp_score(self.credibility.score);
        self.impact.score = clamp_score(self.impact.score);
        self
    }
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },
    #[error("Unparseable judge response: {0}")]
    Parse(String),
}

// ── LLM judge ───────────────────────────────────────────────────────────────

const RUBRIC_PROMPT: &str = "You are a research librarian assessing whether a publication supports \
a given statement. Score relevance (topical match between the statement and the publication), \
credibility (venue and citation standing), and impact (influence on the field), each from 0 to 10. \
Respond with a single JSON object shaped exactly like \
{\"relevance\":{\"score\":0,\"reason\":\"..\"},\"credibility\":{\"score\":0,\"reason\":\"..\"},\
\"impact\":{\"score\":0,\"reason\":\"..\"},\"advantages\":[\"..\"],\"limitations\":[\"..\"]} \
and no other text.";

pub struct LlmJudge {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmJudge {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(LLM_TIMEOUT_SECS))
                .build()
                .unwrap(),
            base_url,
            api_key,
            model,
        }
    }

    pub async fn evaluate(
        &self,
        query: &str,
        record: &LiteratureRecord,
    ) -> Result<Evaluation, JudgeError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": RUBRIC_PROMPT},
                {"role": "user", "content": judge_prompt(query, record)},
            ],
            "max_tokens": 600,
            "temperature": 0.2,
        });
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");
        parse_judge_content(content)
    }
}

fn judge_prompt(query: &str, record: &LiteratureRecord) -> String {
    format!(
        "Statement: {}\n\nPublication:\nTitle: {}\nAuthors: {}\nJournal: {} ({})\nCitations: {}\nAbstract: {}",
        query,
        record.title,
        record.authors.join(", "),
        record.journal,
        record.year,
        record
            .citation_count
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        record.abstract_text.as_deref().unwrap_or("(none)"),
    )
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, JudgeError> {
    let status = resp.status().as_u16();
    let body: serde_json::Value = resp.json().await?;
    if status >= 400 {
        let message = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown API error")
            .to_string();
        return Err(JudgeError::Api { status, message });
    }
    Ok(body)
}

fn strip_code_fences(content: &str) -> &str {
    let mut text = content.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        text = rest.strip_suffix("```").unwrap_or(rest).trim();
    }
    text
}

fn parse_judge_content(content: &str) -> Result<Evaluation, JudgeError> {
    let text = strip_code_fences(content);
    let evaluation: Evaluation =
        serde_json::from_str(text).map_err(|e| JudgeError::Parse(e.to_string()))?;
    Ok(evaluation.clamped())
}

// ── Heuristic fallback ──────────────────────────────────────────────────────

fn clamp_score(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(0.0, MAX_SCORE)
}

pub(crate) fn normalize_citations(count: i64) -> f64 {
    let c = count.max(0) as f64;
    ((1.0 + c).ln() / 1001f64.ln()).min(1.0)
}

pub(crate) fn normalize_impact(factor: f64) -> f64 {
    if !factor.is_finite() || factor <= 0.0 {
        return 0.0;
    }
    (factor / 50.0).min(1.0)
}

fn recency_weight(year: i32) -> f64 {
    // Widen before subtracting; a corrupt year must degrade the score,
    // not overflow.
    let age = (i64::from(chrono::Utc::now().year()) - i64::from(year)).max(0);
    (1.0 - age as f64 / 20.0).clamp(0.0, 1.0)
}

fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(String::from)
        .collect()
}

fn keyword_overlap(query: &str, record: &LiteratureRecord) -> f64 {
    let query_terms = terms(query);
    if query_terms.is_empty() {
        return 0.0;
    }
    let mut doc_terms = terms(&record.title);
    if let Some(ref abstract_text) = record.abstract_text {
        doc_terms.extend(terms(abstract_text));
    }
    let hits = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
    hits as f64 / query_terms.len() as f64
}

/// Deterministic metadata-only scoring, used whenever the LLM judge is
/// unavailable or fails for a record. Keyword overlap dominates relevance;
/// citation standing dominates credibility and impact. All scores stay
/// within [0, 10] for arbitrary input.
pub fn heuristic_evaluation(query: &str, record: &LiteratureRecord) -> Evaluation {
    let overlap = keyword_overlap(query, record);
    let citations = normalize_citations(record.citation_count.map_or(0, i64::from));
    let impact = normalize_impact(record.impact_factor.unwrap_or(0.0));
    let recency = recency_weight(record.year);

    let cites_text = match record.citation_count {
        Some(c) => format!("{} citations", c),
        None => "no citation data".to_string(),
    };
    let impact_text = match record.impact_factor {
        Some(f) if f.is_finite() && f > 0.0 => format!("journal impact factor {:.1}", f),
        _ => "no impact factor".to_string(),
    };

    Evaluation {
        relevance: ScoredAspect {
            score: clamp_score(MAX_SCORE * (0.7 * overlap + 0.2 * citations + 0.1 * impact)),
            reason: format!(
                "{:.0}% of the statement's terms appear in the title or abstract",
                overlap * 100.0
            ),
        },
        credibility: ScoredAspect {
            score: clamp_score(MAX_SCORE * (0.5 * citations + 0.3 * impact + 0.2 * recency)),
            reason: format!("Based on {} and {}", cites_text, impact_text),
        },
        impact: ScoredAspect {
            score: clamp_score(MAX_SCORE * (0.7 * citations + 0.3 * impact)),
            reason: format!("Estimated from {}", cites_text),
        },
        advantages: heuristic_advantages(record, overlap),
        limitations: heuristic_limitations(record),
    }
}

fn heuristic_advantages(record: &LiteratureRecord, overlap: f64) -> Vec<String> {
    let mut advantages = Vec::new();
    if record.citation_count.unwrap_or(0) >= 50 {
        advantages.push("High citation count".to_string());
    }
    if record.verified {
        advantages.push("Metadata verified by the bibliographic registry".to_string());
    }
    if record.impact_factor.is_some_and(|f| f.is_finite() && f >= 10.0) {
        advantages.push("Published in a high-impact venue".to_string());
    }
    if record.abstract_text.is_some() && overlap >= 0.5 {
        advantages.push("Abstract closely matches the statement".to_string());
    }
    advantages
}

fn heuristic_limitations(record: &LiteratureRecord) -> Vec<String> {
    let mut limitations = Vec::new();
    if record.abstract_text.is_none() {
        limitations.push("Abstract missing".to_string());
    }
    match record.citation_count {
        None => limitations.push("Citation count unavailable".to_string()),
        Some(0) => limitations.push("Not yet cited".to_string()),
        Some(_) => {}
    }
    if !record.verified {
        limitations.push("Not verified against the bibliographic registry".to_string());
    }
    if record.year <= chrono::Utc::now().year() - 15 {
        limitations.push("Published more than 15 years ago".to_string());
    }
    limitations
}

// ── Cache and orchestrating evaluator ───────────────────────────────────────

/// Memo of successful judge calls, keyed by statement + record identity.
/// Purely a latency optimization; cleared as a unit.
#[derive(Default)]
pub struct EvaluationCache {
    entries: Mutex<HashMap<String, Evaluation>>,
}

impl EvaluationCache {
    pub async fn get(&self, key: &str) -> Option<Evaluation> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn insert(&self, key: String, evaluation: Evaluation) {
        self.entries.lock().await.insert(key, evaluation);
    }

    /// Clear every entry, returning how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        count
    }
}

pub struct Evaluator {
    judge: Option<LlmJudge>,
    cache: EvaluationCache,
}

impl Evaluator {
    pub fn new(judge: Option<LlmJudge>) -> Self {
        Self {
            judge,
            cache: EvaluationCache::default(),
        }
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    pub fn cache(&self) -> &EvaluationCache {
        &self.cache
    }

    /// Evaluate one record. Never fails: a judge error falls back to the
    /// metadata heuristic for this record alone. Only judge successes are
    /// cached, so the heuristic never shadows a recovered judge.
    pub async fn evaluate(&self, query: &str, record: &LiteratureRecord) -> Evaluation {
        let key = format!("{}|{}", query, canonical_key(record));
        if let Some(hit) = self.cache.get(&key).await {
            return hit;
        }
        if let Some(ref judge) = self.judge {
            match judge.evaluate(query, record).await {
                Ok(evaluation) => {
                    self.cache.insert(key, evaluation.clone()).await;
                    return evaluation;
                }
                Err(e) => {
                    tracing::warn!(
                        "LLM judge failed for '{}': {}; using heuristic scores",
                        record.title,
                        e
                    );
                }
            }
        }
        heuristic_evaluation(query, record)
    }

    pub async fn evaluate_all(
        &self,
        query: &str,
        records: &[LiteratureRecord],
    ) -> Vec<Evaluation> {
        join_all(records.iter().map(|r| self.evaluate(query, r))).await
    }
}
