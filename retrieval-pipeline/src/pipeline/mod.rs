pub mod config;

use std::sync::Arc;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::context_node::ScoredNode},
};
use ingestion_pipeline::enricher::AiEnricher;
use tracing::instrument;

pub use config::{RetrievalConfig, LARGE_SCOPE_NODE_THRESHOLD};

use crate::{
    answer_retrieval::{self, RagOptions, RagResult},
    context_window::{self, ContextWindow, WindowOptions},
    fts, graph, semantic,
};

/// Which mode actually produced a [`SearchOutcome`]. Semantic and Graph can silently
/// degrade (to Text, to Semantic) on provider trouble; `mode` always names the mode that
/// *ran*, with `degraded` flagging that it wasn't the one requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Text,
    Semantic,
    Hybrid,
    Graph,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub mode: SearchMode,
    pub degraded: bool,
    pub results: Vec<ScoredNode>,
}

/// Owns the shared dependencies every search mode and the RAG pipeline read from: the
/// store, the provider client wrapper, and one snapshot of the tunable constants.
pub struct SearchEngine {
    db: Arc<SurrealDbClient>,
    enricher: Arc<AiEnricher>,
    config: RetrievalConfig,
}

impl SearchEngine {
    pub fn new(db: Arc<SurrealDbClient>, enricher: Arc<AiEnricher>, config: RetrievalConfig) -> Self {
        Self { db, enricher, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// `Text(query, filters, limit)`.
    #[instrument(skip(self, query), fields(%user_id))]
    pub async fn search_text(
        &self,
        user_id: &str,
        query: &str,
        context_id: Option<&str>,
        limit: u32,
    ) -> Result<SearchOutcome, AppError> {
        let results = fts::search_text(&self.db, user_id, query, context_id, limit).await?;
        Ok(SearchOutcome {
            mode: SearchMode::Text,
            degraded: false,
            results,
        })
    }

    /// `Semantic(query, filters, limit)`, degrading to Text if the query embedding call
    /// falls back to the deterministic vector.
    #[instrument(skip(self, query), fields(%user_id))]
    pub async fn search_semantic(
        &self,
        user_id: &str,
        query: &str,
        context_id: Option<&str>,
        limit: u32,
    ) -> Result<SearchOutcome, AppError> {
        let outcome =
            semantic::search_semantic(&self.db, &self.enricher, user_id, query, context_id, limit)
                .await?;
        let degraded = outcome.degraded();
        Ok(SearchOutcome {
            mode: SearchMode::Semantic,
            degraded,
            results: outcome.into_nodes(),
        })
    }

    /// `Hybrid(query, limit)`: reciprocal rank fusion of Text and Semantic.
    #[instrument(skip(self, query), fields(%user_id))]
    pub async fn search_hybrid(
        &self,
        user_id: &str,
        query: &str,
        context_id: Option<&str>,
        limit: u32,
    ) -> Result<SearchOutcome, AppError> {
        let results = answer_retrieval::search_hybrid(
            &self.db,
            &self.enricher,
            &self.config,
            user_id,
            context_id,
            query,
            limit,
        )
        .await?;
        Ok(SearchOutcome {
            mode: SearchMode::Hybrid,
            degraded: false,
            results,
        })
    }

    /// `Graph(query, seedContextId, limit, maxDepth)`, degrading to Semantic while the
    /// scope's graph is still being built.
    #[instrument(skip(self, query), fields(%user_id, %seed_context_id))]
    pub async fn search_graph(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        query: &str,
        seed_context_id: &str,
        limit: u32,
    ) -> Result<SearchOutcome, AppError> {
        let outcome = graph::search_graph(
            &self.db,
            &self.enricher,
            user_id,
            project_id,
            query,
            seed_context_id,
            limit,
            self.config.graph_max_depth,
            self.config.graph_alpha,
            self.config.graph_beta,
        )
        .await?;
        let degraded = outcome.degraded();
        Ok(SearchOutcome {
            mode: SearchMode::Graph,
            degraded,
            results: outcome.into_nodes(),
        })
    }

    /// Packs a candidate set into a [`ContextWindow`] under `max_tokens`.
    pub fn build_context_window(
        &self,
        candidates: Vec<ScoredNode>,
        max_tokens: u32,
        options: &WindowOptions,
    ) -> ContextWindow {
        context_window::build_context_window(candidates, max_tokens, options)
    }

    /// `RAG(query, options)`.
    #[instrument(skip(self, query, options), fields(%user_id))]
    pub async fn generate_answer(
        &self,
        user_id: &str,
        query: &str,
        options: &RagOptions,
    ) -> Result<RagResult, AppError> {
        answer_retrieval::generate(&self.db, &self.enricher, &self.config, user_id, query, options)
            .await
    }
}
