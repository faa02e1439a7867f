//! Graph search: seeds from a Semantic lookup over one context, then expands outward over
//! C4 edges up to a bounded depth, scoring each reached node by a blend of query semantic
//! similarity and the strength of the path that reached it.

use std::collections::HashMap;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            context_graph::ContextGraph,
            context_node::{ContextNode, ScoredNode},
            graph_edge::GraphEdge,
        },
    },
};
use ingestion_pipeline::enricher::AiEnricher;

use crate::semantic::search_semantic;

/// How many of the seed context's own nodes feed the BFS as depth-0 starting points.
const SEED_TAKE: u32 = 10;

pub enum GraphOutcome {
    Expanded(Vec<ScoredNode>),
    /// The scope's graph is mid-rebuild; callers receive Semantic results instead.
    DegradedToSemantic(Vec<ScoredNode>),
}

impl GraphOutcome {
    pub fn into_nodes(self) -> Vec<ScoredNode> {
        match self {
            Self::Expanded(nodes) | Self::DegradedToSemantic(nodes) => nodes,
        }
    }

    pub fn degraded(&self) -> bool {
        matches!(self, Self::DegradedToSemantic(_))
    }
}

/// `Graph(query, seedContextId, limit, maxDepth)`.
#[allow(clippy::too_many_arguments)]
pub async fn search_graph(
    db: &SurrealDbClient,
    enricher: &AiEnricher,
    user_id: &str,
    project_id: Option<&str>,
    query: &str,
    seed_context_id: &str,
    limit: u32,
    max_depth: u32,
    alpha: f32,
    beta: f32,
) -> Result<GraphOutcome, AppError> {
    let graph = ContextGraph::get_or_create(db, user_id, project_id).await?;
    if matches!(graph.state.as_str(), "Building" | "Rebuilding") {
        let degraded = search_semantic(db, enricher, user_id, query, None, limit).await?;
        return Ok(GraphOutcome::DegradedToSemantic(degraded.into_nodes()));
    }

    let embedding = enricher.embed_one(query).await;
    let seeds = ContextNode::vector_search(
        db,
        user_id,
        &embedding.vector,
        Some(seed_context_id),
        SEED_TAKE,
        64,
    )
    .await?;

    let edges = GraphEdge::for_scope(db, &graph.id).await?;
    let mut adjacency: HashMap<&str, Vec<(&str, f32)>> = HashMap::new();
    for edge in &edges {
        adjacency
            .entry(edge.source_id.as_str())
            .or_default()
            .push((edge.target_id.as_str(), edge.weight));
        adjacency
            .entry(edge.target_id.as_str())
            .or_default()
            .push((edge.source_id.as_str(), edge.weight));
    }

    // Widest-path BFS bounded by `max_depth`: each visited node keeps the strongest
    // (highest-product) path that reached it, not merely the first.
    let mut best: HashMap<String, (u32, f32)> = HashMap::new();
    let mut queue: std::collections::VecDeque<(String, u32, f32)> = std::collections::VecDeque::new();
    for seed in &seeds {
        best.insert(seed.node.id.clone(), (0, 1.0));
        queue.push_back((seed.node.id.clone(), 0, 1.0));
    }

    while let Some((id, depth, product)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let Some(neighbors) = adjacency.get(id.as_str()) else {
            continue;
        };
        for (neighbor, weight) in neighbors {
            let candidate_product = product * weight;
            let improves = match best.get(*neighbor) {
                Some((_, existing_product)) => candidate_product > *existing_product,
                None => true,
            };
            if improves {
                best.insert(neighbor.to_string(), (depth + 1, candidate_product));
                queue.push_back((neighbor.to_string(), depth + 1, candidate_product));
            }
        }
    }

    let mut seeds_by_id: HashMap<String, ScoredNode> =
        seeds.into_iter().map(|s| (s.node.id.clone(), s)).collect();

    let mut scored = Vec::with_capacity(best.len());
    for (id, (_, product)) in &best {
        if let Some(seed) = seeds_by_id.remove(id) {
            scored.push(ScoredNode {
                score: alpha * seed.score + beta * product,
                node: seed.node,
            });
            continue;
        }
        let Some(node) = db.get_item::<ContextNode>(id).await? else {
            continue;
        };
        let semantic_score = node
            .embedding
            .as_ref()
            .map(|v| cosine_similarity(&embedding.vector, v))
            .unwrap_or(0.0);
        scored.push(ScoredNode {
            score: alpha * semantic_score + beta * product,
            node,
        });
    }

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit as usize);

    Ok(GraphOutcome::Expanded(scored))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::config::OpenAIConfig;
    use common::storage::types::context_node::ChunkType;
    use graph_builder::{rebuild_scope, GraphBuildParams};

    fn test_enricher() -> AiEnricher {
        let client = std::sync::Arc::new(async_openai::Client::with_config(
            OpenAIConfig::new().with_api_key("test-key"),
        ));
        AiEnricher::new(
            client,
            "text-embedding-3-small".to_string(),
            "gpt-4o-mini".to_string(),
            3,
            1_000,
            1_000,
            1_000,
            4,
        )
    }

    fn node(context_id: &str, embedding: Vec<f32>, index: u32) -> ContextNode {
        let now = chrono::Utc::now();
        ContextNode {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            context_id: context_id.to_string(),
            parent_node_id: None,
            child_node_ids: vec![],
            content: "chunking system performance overview".to_string(),
            token_count: 10,
            chunk_type: ChunkType::Paragraph,
            chunk_index: index,
            importance: 0.6,
            title: "chunk".to_string(),
            summary: String::new(),
            keywords: vec![],
            embedding: Some(embedding),
            embedding_model_version: Some("v1".to_string()),
            needs_reenrichment: false,
        }
    }

    fn stored_context(user_id: &str) -> common::storage::types::context::Context {
        common::storage::types::context::Context::new(
            user_id.to_string(),
            common::storage::types::context::NewContext {
                title: "S".to_string(),
                content: "chunking system performance overview".to_string(),
                context_type: common::storage::types::context::ContextType::Note,
                project_id: None,
                tags: vec![],
                source: None,
                metadata: None,
            },
        )
        .expect("valid context input")
    }

    #[tokio::test]
    async fn expands_beyond_the_seed_context_over_edges() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.ensure_initialized(3).await.expect("init schema");

        let seed_context = stored_context("user1");
        let other_context = stored_context("user1");
        let seed_ctx = seed_context.id.clone();
        let other_ctx = other_context.id.clone();
        db.store_item(seed_context).await.expect("store seed context");
        db.store_item(other_context).await.expect("store other context");

        ContextNode::upsert_for_context(
            &db,
            &seed_ctx,
            vec![node(&seed_ctx, vec![1.0, 0.0, 0.0], 0)],
        )
        .await
        .unwrap();
        ContextNode::upsert_for_context(
            &db,
            &other_ctx,
            vec![node(&other_ctx, vec![0.99, 0.01, 0.0], 0)],
        )
        .await
        .unwrap();

        rebuild_scope(
            &db,
            "user1",
            None,
            &[seed_ctx.clone(), other_ctx.clone()],
            GraphBuildParams {
                embedding_dim: 3,
                k_hyperplanes: 12,
                r_neighbor_buckets: 8,
                top_k_edges: 16,
                similarity_threshold: 0.1,
            },
        )
        .await
        .unwrap();

        let outcome = search_graph(
            &db,
            &test_enricher(),
            "user1",
            None,
            "chunking performance",
            &seed_ctx,
            10,
            2,
            0.7,
            0.3,
        )
        .await
        .unwrap();

        assert!(!outcome.degraded());
        let nodes = outcome.into_nodes();
        assert!(nodes.iter().any(|n| n.node.context_id == other_ctx));
    }

    #[tokio::test]
    async fn degrades_to_semantic_while_graph_is_rebuilding() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.ensure_initialized(3).await.expect("init schema");

        let context = stored_context("user1");
        let context_id = context.id.clone();
        db.store_item(context).await.expect("store context");
        ContextNode::upsert_for_context(
            &db,
            &context_id,
            vec![node(&context_id, vec![1.0, 0.0, 0.0], 0)],
        )
        .await
        .unwrap();

        let graph = ContextGraph::get_or_create(&db, "user1", None)
            .await
            .expect("graph");
        ContextGraph::set_state(&db, &graph.id, "Rebuilding")
            .await
            .expect("set state");

        let outcome = search_graph(
            &db,
            &test_enricher(),
            "user1",
            None,
            "chunking performance",
            &context_id,
            10,
            2,
            0.7,
            0.3,
        )
        .await
        .unwrap();

        assert!(outcome.degraded());
    }
}
