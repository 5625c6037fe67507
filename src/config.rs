use std::sync::Arc;

use crate::apis::crossref::CrossRefClient;
use crate::apis::exa::ExaClient;
use crate::apis::{BibliographicSource, SearchProvider};
use crate::judge::{Evaluator, LlmJudge};

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_RESULTS: usize = 10;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub exa_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub max_results_per_sentence: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let exa_api_key = std::env::var("EXA_API_KEY").ok();
        let crossref_mailto = std::env::var("CROSSREF_MAILTO").ok();
        let llm_api_key = std::env::var("LLM_API_KEY").ok();
        let llm_base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string());
        let llm_model =
            std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string());
        let max_results_per_sentence = std::env::var("CITE_FINDER_MAX_RESULTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_RESULTS);

        Self {
            exa_api_key,
            crossref_mailto,
            llm_api_key,
            llm_base_url,
            llm_model,
            max_results_per_sentence,
        }
    }

    /// Build the neural provider if a credential is configured.
    pub fn build_neural(&self) -> Option<Arc<dyn SearchProvider>> {
        match self.exa_api_key {
            Some(ref key) => Some(Arc::new(ExaClient::new(key.clone()))),
            None => {
                tracing::warn!("Neural search disabled: EXA_API_KEY not set");
                None
            }
        }
    }

    /// Build the bibliographic provider. No credential required.
    pub fn build_bibliographic(&self) -> Arc<dyn BibliographicSource> {
        Arc::new(CrossRefClient::new(self.crossref_mailto.clone()))
    }

    /// Build the evaluator, with the LLM judge attached when configured.
    pub fn build_evaluator(&self) -> Evaluator {
        let judge = match self.llm_api_key {
            Some(ref key) => Some(LlmJudge::new(
                key.clone(),
                self.llm_base_url.clone(),
                self.llm_model.clone(),
            )),
            None => {
                tracing::warn!("LLM judge disabled: LLM_API_KEY not set; evaluations use heuristic scores");
                None
            }
        };
        Evaluator::new(judge)
    }

    /// Return a list of provider status descriptions.
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        vec![
            ProviderStatus {
                name: "exa".into(),
                enabled: self.exa_api_key.is_some(),
                note: if self.exa_api_key.is_some() {
                    "API key set".into()
                } else {
                    "Disabled: EXA_API_KEY not set".into()
                },
            },
            ProviderStatus {
                name: "crossref".into(),
                enabled: true,
                note: if self.crossref_mailto.is_some() {
                    "Polite pool email set".into()
                } else {
                    "No email (anonymous pool)".into()
                },
            },
            ProviderStatus {
                name: "llm-judge".into(),
                enabled: self.llm_api_key.is_some(),
                note: if self.llm_api_key.is_some() {
                    format!("Model: {}", self.llm_model)
                } else {
                    "Disabled: LLM_API_KEY not set (heuristic evaluation only)".into()
                },
            },
        ]
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub enabled: bool,
    pub note: String,
}
