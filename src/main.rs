use std::sync::Arc;

use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters,
    model::*, tool, tool_handler, tool_router,
    transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

mod apis;
mod config;
mod dedup;
mod judge;
mod pipeline;
mod rank;
mod retry;
mod split;

use config::Config;
use pipeline::{Pipeline, PipelineError};

// ── Parameter structs ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct FindLiteratureParams {
    #[schemars(description = "Free-form text; supporting literature is retrieved per sentence")]
    text: String,
    #[schemars(description = "Maximum results per sentence (default 10, max 50)")]
    max_results: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchSentenceParams {
    #[schemars(description = "A single sentence or claim to find supporting literature for")]
    query: String,
    #[schemars(description = "Maximum results to return (default 10, max 50)")]
    max_results: Option<u32>,
}

// ── Server ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct CiteFinderServer {
    tool_router: ToolRouter<Self>,
    config: Arc<Config>,
    pipeline: Arc<Pipeline>,
}

#[tool_router]
impl CiteFinderServer {
    pub fn create() -> Self {
        let config = Config::from_env();
        let pipeline = Pipeline::new(
            config.build_neural(),
            config.build_bibliographic(),
            Arc::new(config.build_evaluator()),
            config.max_results_per_sentence,
        );

        tracing::info!(
            "Initialized cite-finder (neural: {}, LLM judge: {})",
            config.exa_api_key.is_some(),
            pipeline.evaluator().has_judge()
        );

        Self {
            tool_router: Self::tool_router(),
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }

    #[tool(description = "Split text into sentences and find supporting academic literature for \
        each one. Returns per-sentence deduplicated, ranked, and evaluated results.")]
    async fn find_literature(
        &self,
        Parameters(params): Parameters<FindLiteratureParams>,
    ) -> Result<CallToolResult, McpError> {
        let results = self
            .pipeline_for(params.max_results)
            .run(&params.text)
            .await
            .map_err(pipeline_error)?;

        let json = serde_json::to_string_pretty(&results)
            .map_err(|e| McpError::internal_error(format!("{}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Find supporting academic literature for a single sentence or claim")]
    async fn search_sentence(
        &self,
        Parameters(params): Parameters<SearchSentenceParams>,
    ) -> Result<CallToolResult, McpError> {
        let results = self
            .pipeline_for(params.max_results)
            .search_sentence(&params.query)
            .await
            .map_err(pipeline_error)?;

        let json = serde_json::to_string_pretty(&results)
            .map_err(|e| McpError::internal_error(format!("{}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "List the configured literature providers and their status")]
    async fn list_providers(&self) -> Result<CallToolResult, McpError> {
        let statuses = self.config.provider_status();
        let json = serde_json::to_string_pretty(&statuses)
            .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Clear all cached LLM evaluations")]
    async fn clear_evaluation_cache(&self) -> Result<CallToolResult, McpError> {
        let cleared = self.pipeline.evaluator().cache().clear().await;
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Cleared {} cached evaluations",
            cleared
        ))]))
    }
}

impl CiteFinderServer {
    fn pipeline_for(&self, max_results: Option<u32>) -> Pipeline {
        match max_results {
            Some(max) => self
                .pipeline
                .as_ref()
                .clone()
                .with_max_results(max.clamp(1, 50) as usize),
            None => self.pipeline.as_ref().clone(),
        }
    }
}

fn pipeline_error(e: PipelineError) -> McpError {
    match e {
        PipelineError::NeuralUnconfigured => McpError::invalid_params(e.to_string(), None),
    }
}

#[tool_handler]
impl ServerHandler for CiteFinderServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Find supporting academic literature for free-form text. Each sentence is \
                 matched against Exa semantic search and the CrossRef registry; results are \
                 deduplicated, cross-enriched, ranked by verification and citation standing, \
                 and scored for relevance, credibility, and impact."
                    .into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting cite-finder MCP server");

    let server = CiteFinderServer::create();
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
