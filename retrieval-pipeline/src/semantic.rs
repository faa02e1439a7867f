//! Semantic search: embeds the query and ranks candidates by cosine similarity over the
//! HNSW vector index. Degrades to Text whenever the query embedding itself had to fall
//! back to the deterministic hash vector — a fallback-embedded query carries no real
//! semantic signal, so ranking by it would be worse than falling back outright.

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::context_node::ScoredNode},
};
use ingestion_pipeline::enricher::AiEnricher;

use crate::fts;

/// Default `ef` (HNSW search-list width) used when callers don't need to tune recall vs.
/// latency directly.
const DEFAULT_EF: u32 = 64;

pub enum SemanticOutcome {
    Ranked(Vec<ScoredNode>),
    DegradedToText(Vec<ScoredNode>),
}

impl SemanticOutcome {
    pub fn into_nodes(self) -> Vec<ScoredNode> {
        match self {
            Self::Ranked(nodes) | Self::DegradedToText(nodes) => nodes,
        }
    }

    pub fn degraded(&self) -> bool {
        matches!(self, Self::DegradedToText(_))
    }
}

/// `Semantic(query, filters, limit)`.
pub async fn search_semantic(
    db: &SurrealDbClient,
    enricher: &AiEnricher,
    user_id: &str,
    query: &str,
    context_id: Option<&str>,
    limit: u32,
) -> Result<SemanticOutcome, AppError> {
    let embedding = enricher.embed_one(query).await;
    if embedding.is_fallback {
        let fallback = fts::search_text(db, user_id, query, context_id, limit).await?;
        return Ok(SemanticOutcome::DegradedToText(fallback));
    }

    let nodes = common::storage::types::context_node::ContextNode::vector_search(
        db,
        user_id,
        &embedding.vector,
        context_id,
        limit,
        DEFAULT_EF,
    )
    .await?;
    Ok(SemanticOutcome::Ranked(nodes))
}
