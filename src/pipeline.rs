use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::apis::{
    looks_like_doi, BibliographicSource, LiteratureRecord, ProviderError, SearchProvider,
};
use crate::dedup::{merge_and_deduplicate, normalize_text};
use crate::judge::{Evaluation, Evaluator};
use crate::rank::sort_by_quality;
use crate::retry::{with_retry, RetryPolicy};
use crate::split::split_sentences;

const LOOKUP_CONCURRENCY: usize = 4;
const TITLE_MATCH_THRESHOLD: f64 = 0.85;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("neural provider is not configured; set EXA_API_KEY to enable retrieval")]
    NeuralUnconfigured,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluatedRecord {
    #[serde(flatten)]
    pub record: LiteratureRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentenceLiterature {
    pub sentence: String,
    pub sentence_index: usize,
    pub literature: Vec<EvaluatedRecord>,
}

/// Per-sentence retrieval pipeline: fan out to both providers, merge and
/// deduplicate, backfill missing metadata from the bibliographic registry,
/// rank, then evaluate the survivors.
#[derive(Clone)]
pub struct Pipeline {
    neural: Option<Arc<dyn SearchProvider>>,
    bibliographic: Arc<dyn BibliographicSource>,
    evaluator: Arc<Evaluator>,
    retry: RetryPolicy,
    max_per_sentence: usize,
}

impl Pipeline {
    pub fn new(
        neural: Option<Arc<dyn SearchProvider>>,
        bibliographic: Arc<dyn BibliographicSource>,
        evaluator: Arc<Evaluator>,
        max_per_sentence: usize,
    ) -> Self {
        Self {
            neural,
            bibliographic,
            evaluator,
            retry: RetryPolicy::default(),
            max_per_sentence,
        }
    }

    pub fn with_max_results(mut self, max_per_sentence: usize) -> Self {
        self.max_per_sentence = max_per_sentence;
        self
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Split `text` into sentences and retrieve literature for each one
    /// concurrently. Output order always matches sentence order; a panicked
    /// sentence task degrades to an empty result set for that sentence only.
    pub async fn run(&self, text: &str) -> Result<Vec<SentenceLiterature>, PipelineError> {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return Ok(Vec::new());
        }
        let neural = self
            .neural
            .clone()
            .ok_or(PipelineError::NeuralUnconfigured)?;

        let handles: Vec<_> = sentences
            .iter()
            .map(|sentence| {
                let this = self.clone();
                let neural = Arc::clone(&neural);
                let sentence = sentence.clone();
                tokio::spawn(async move { this.gather(&neural, &sentence).await })
            })
            .collect();

        let mut output = Vec::with_capacity(sentences.len());
        for (i, handle) in handles.into_iter().enumerate() {
            let literature = match handle.await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("Sentence task panicked: {}", e);
                    Vec::new()
                }
            };
            output.push(SentenceLiterature {
                sentence: sentences[i].clone(),
                sentence_index: i + 1,
                literature,
            });
        }
        Ok(output)
    }

    /// Single-query path: the same retrieval stages as `run`, without
    /// sentence splitting.
    pub async fn search_sentence(
        &self,
        query: &str,
    ) -> Result<Vec<EvaluatedRecord>, PipelineError> {
        let neural = self
            .neural
            .clone()
            .ok_or(PipelineError::NeuralUnconfigured)?;
        Ok(self.gather(&neural, query).await)
    }

    async fn gather(&self, neural: &Arc<dyn SearchProvider>, query: &str) -> Vec<EvaluatedRecord> {
        let max = self.max_per_sentence as u32;
        let (neural_results, biblio_results, title_results) = tokio::join!(
            neural.search(query, max),
            self.bibliographic.search(query, max),
            self.bibliographic.search_title(query, max),
        );

        // Bibliographic candidates go first so that on a merge tie the
        // verified side is the one already seen.
        let mut candidates = Vec::new();
        for (source, kind, outcome) in [
            (self.bibliographic.name(), "search", biblio_results),
            (self.bibliographic.name(), "title search", title_results),
            (neural.name(), "search", neural_results),
        ] {
            match outcome {
                Ok(records) => candidates.extend(records),
                Err(e) => {
                    tracing::warn!("{} {} failed for '{}': {}", source, kind, query, e);
                }
            }
        }

        let mut records = merge_and_deduplicate(candidates);
        self.enrich(&mut records).await;
        sort_by_quality(&mut records);
        records.truncate(self.max_per_sentence);

        let evaluations = self.evaluator.evaluate_all(query, &records).await;
        records
            .into_iter()
            .zip(evaluations)
            .map(|(record, evaluation)| EvaluatedRecord {
                record,
                evaluation: Some(evaluation),
            })
            .collect()
    }

    /// Resolve identifiers against the bibliographic registry, bounded to
    /// `LOOKUP_CONCURRENCY` in-flight requests with retry on each. The output
    /// is index-aligned with the input; an unresolvable identifier yields
    /// `None`, never a batch failure.
    pub async fn lookup_identifiers(
        &self,
        identifiers: &[String],
    ) -> Vec<Option<LiteratureRecord>> {
        let semaphore = Arc::new(Semaphore::new(LOOKUP_CONCURRENCY));
        let handles: Vec<_> = identifiers
            .iter()
            .map(|identifier| {
                let semaphore = Arc::clone(&semaphore);
                let bibliographic = Arc::clone(&self.bibliographic);
                let retry = self.retry.clone();
                let identifier = identifier.clone();
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|_| ProviderError::Api("lookup semaphore closed".to_string()))?;
                    with_retry(&retry, "identifier lookup", || {
                        bibliographic.lookup(&identifier)
                    })
                    .await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(identifiers.len());
        for (i, handle) in handles.into_iter().enumerate() {
            let hit = match handle.await {
                Ok(Ok(hit)) => hit,
                Ok(Err(e)) => {
                    tracing::warn!("Lookup failed for '{}': {}", identifiers[i], e);
                    None
                }
                Err(e) => {
                    tracing::warn!("Lookup task panicked: {}", e);
                    None
                }
            };
            results.push(hit);
        }
        results
    }

    /// Top-hit title searches with the same bounded fan-out and retry as
    /// `lookup_identifiers`. Index-aligned with the input; a failed or
    /// empty search yields `None`.
    async fn search_titles(&self, titles: &[String]) -> Vec<Option<LiteratureRecord>> {
        let semaphore = Arc::new(Semaphore::new(LOOKUP_CONCURRENCY));
        let handles: Vec<_> = titles
            .iter()
            .map(|title| {
                let semaphore = Arc::clone(&semaphore);
                let bibliographic = Arc::clone(&self.bibliographic);
                let retry = self.retry.clone();
                let title = title.clone();
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|_| ProviderError::Api("lookup semaphore closed".to_string()))?;
                    with_retry(&retry, "title enrichment search", || {
                        bibliographic.search_title(&title, 1)
                    })
                    .await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(titles.len());
        for (i, handle) in handles.into_iter().enumerate() {
            let hit = match handle.await {
                Ok(Ok(hits)) => hits.into_iter().next(),
                Ok(Err(e)) => {
                    tracing::warn!("Title enrichment failed for '{}': {}", titles[i], e);
                    None
                }
                Err(e) => {
                    tracing::warn!("Title search task panicked: {}", e);
                    None
                }
            };
            results.push(hit);
        }
        results
    }

    /// Backfill missing metadata on unverified records from the
    /// bibliographic registry: DOI-shaped identifiers are looked up
    /// directly, the rest go through a title search gated on near-exact
    /// title similarity. Only absent or placeholder fields are filled.
    async fn enrich(&self, records: &mut [LiteratureRecord]) {
        let mut doi_targets = Vec::new();
        let mut title_targets = Vec::new();
        for (i, record) in records.iter().enumerate() {
            if !needs_enrichment(record) {
                continue;
            }
            if looks_like_doi(&record.identifier) {
                doi_targets.push((i, record.identifier.clone()));
            } else {
                title_targets.push(i);
            }
        }

        if !doi_targets.is_empty() {
            let identifiers: Vec<String> =
                doi_targets.iter().map(|(_, id)| id.clone()).collect();
            let found = self.lookup_identifiers(&identifiers).await;
            for ((i, _), hit) in doi_targets.into_iter().zip(found) {
                if let Some(reference) = hit {
                    apply_backfill(&mut records[i], &reference);
                }
            }
        }

        if !title_targets.is_empty() {
            let titles: Vec<String> = title_targets
                .iter()
                .map(|&i| records[i].title.clone())
                .collect();
            let found = self.search_titles(&titles).await;
            for (i, top) in title_targets.into_iter().zip(found) {
                if let Some(top) = top {
                    let similarity = strsim::normalized_levenshtein(
                        &normalize_text(&records[i].title),
                        &normalize_text(&top.title),
                    );
                    if similarity >= TITLE_MATCH_THRESHOLD {
                        apply_backfill(&mut records[i], &top);
                    }
                }
            }
        }
    }
}

fn needs_enrichment(record: &LiteratureRecord) -> bool {
    !record.verified
        && (!record.has_real_authors()
            || !record.has_real_journal()
            || record.abstract_text.is_none()
            || !looks_like_doi(&record.identifier))
}

/// Fill absent or placeholder fields from `reference`. `verified` and
/// `source` are identity fields and never change here.
fn apply_backfill(record: &mut LiteratureRecord, reference: &LiteratureRecord) {
    if !record.has_real_authors() && reference.has_real_authors() {
        record.authors = reference.authors.clone();
    }
    if !record.has_real_journal() && reference.has_real_journal() {
        record.journal = reference.journal.clone();
    }
    if record.abstract_text.is_none() {
        record.abstract_text = reference.abstract_text.clone();
    }
    if record.citation_count.is_none() {
        record.citation_count = reference.citation_count;
    }
    if record.impact_factor.is_none() {
        record.impact_factor = reference.impact_factor;
    }
    if !record.has_identifier() && reference.has_identifier() {
        record.identifier = reference.identifier.clone();
    }
}
