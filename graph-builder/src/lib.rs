#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod builder;
pub mod lsh;
pub mod similarity;
pub mod state;

use std::collections::{HashMap, HashSet};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            context::Context,
            context_graph::{scope_key, ContextGraph},
            context_node::ContextNode,
            graph_edge::{EdgeKind, GraphEdge},
        },
    },
};

use builder::{structural_edges, CandidateEdge, GraphIndex, StructuralNode};
use similarity::NodeFeatures;

/// Tunable knobs for one graph build, mirroring the configured LSH/edge-retention
/// parameters so callers don't have to thread five primitives through every call.
#[derive(Debug, Clone, Copy)]
pub struct GraphBuildParams {
    pub embedding_dim: usize,
    pub k_hyperplanes: u32,
    pub r_neighbor_buckets: usize,
    pub top_k_edges: usize,
    pub similarity_threshold: f32,
}

/// Loads every node a scope owns, derives [`NodeFeatures`]/[`StructuralNode`] views, and
/// runs `GraphIndex::build` plus `structural_edges`, then persists the result atomically:
/// `ContextGraph::commit_build` only ever replaces the previous good version with a
/// wholly new one.
pub async fn rebuild_scope(
    db: &SurrealDbClient,
    user_id: &str,
    project_id: Option<&str>,
    context_ids: &[String],
    params: GraphBuildParams,
) -> Result<RebuildOutcome, AppError> {
    let scope = scope_key(user_id, project_id);
    let graph = ContextGraph::get_or_create(db, user_id, project_id).await?;
    let building_state = match graph.state.as_str() {
        "Stale" => "Rebuilding",
        _ => "Building",
    };
    ContextGraph::set_state(db, &graph.id, building_state).await?;

    let mut nodes = Vec::new();
    let mut context_tags: HashMap<String, HashSet<String>> = HashMap::new();
    for context_id in context_ids {
        let context = Context::get(db, user_id, context_id).await?;
        context_tags.insert(context_id.clone(), context.tags.into_iter().collect());
        nodes.extend(ContextNode::get_for_context(db, context_id).await?);
    }

    let features: Vec<NodeFeatures> = nodes
        .iter()
        .map(|n| node_features(n, context_tags.get(&n.context_id).cloned().unwrap_or_default()))
        .collect();
    let structural: Vec<StructuralNode> = nodes.iter().map(structural_node).collect();

    let index = GraphIndex::new(
        &scope,
        params.embedding_dim,
        params.k_hyperplanes,
        params.r_neighbor_buckets,
        params.top_k_edges,
        params.similarity_threshold,
    );

    let similarity_candidates = index.build(&features);
    let structural_candidates = structural_edges(&structural);

    let mut edges = materialize_similarity_edges(&scope, similarity_candidates);
    edges.extend(materialize_structural_edges(&scope, structural_candidates, &structural));
    let node_ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();

    GraphEdge::store_many(db, edges.clone()).await?;
    ContextGraph::commit_build(db, &graph.id, node_ids.clone(), "Ready").await?;

    Ok(RebuildOutcome {
        scope_key: scope,
        node_count: node_ids.len(),
        edge_count: edges.len(),
    })
}

/// Incremental `AddNode` path: scores one new node against the scope's existing nodes and
/// persists only the resulting edges, without touching the rest of the graph.
pub async fn add_node(
    db: &SurrealDbClient,
    user_id: &str,
    project_id: Option<&str>,
    new_node: &ContextNode,
    existing_context_ids: &[String],
    params: GraphBuildParams,
) -> Result<usize, AppError> {
    let scope = scope_key(user_id, project_id);

    let mut existing = Vec::new();
    let mut context_tags: HashMap<String, HashSet<String>> = HashMap::new();
    for context_id in existing_context_ids {
        let context = Context::get(db, user_id, context_id).await?;
        context_tags.insert(context_id.clone(), context.tags.into_iter().collect());
        existing.extend(ContextNode::get_for_context(db, context_id).await?);
    }
    let existing_features: Vec<NodeFeatures> = existing
        .iter()
        .map(|n| node_features(n, context_tags.get(&n.context_id).cloned().unwrap_or_default()))
        .collect();

    let new_context = Context::get(db, user_id, &new_node.context_id).await?;
    let new_features = node_features(new_node, new_context.tags.into_iter().collect());

    let index = GraphIndex::new(
        &scope,
        params.embedding_dim,
        params.k_hyperplanes,
        params.r_neighbor_buckets,
        params.top_k_edges,
        params.similarity_threshold,
    );
    let candidates = index.add_node(&new_features, &existing_features);
    let edges: Vec<GraphEdge> = candidates
        .into_iter()
        .filter_map(|c| {
            GraphEdge::new(
                scope.clone(),
                c.source_id,
                c.target_id,
                EdgeKind::Similar,
                c.weight,
                None,
            )
            .ok()
        })
        .collect();

    let count = edges.len();
    GraphEdge::store_many(db, edges).await?;

    let graph = ContextGraph::get_or_create(db, user_id, project_id).await?;
    ContextGraph::append_node(db, &graph.id, &new_node.id).await?;

    Ok(count)
}

/// Removes a node's incident edges and marks the scope's graph compaction counter,
/// matching the store contract's `removed_since_compaction` bookkeeping.
pub async fn remove_node(
    db: &SurrealDbClient,
    user_id: &str,
    project_id: Option<&str>,
    node_id: &str,
) -> Result<u32, AppError> {
    let scope = scope_key(user_id, project_id);
    let graph = ContextGraph::get_or_create(db, user_id, project_id).await?;
    GraphEdge::delete_incident(db, &scope, node_id).await?;
    ContextGraph::mark_node_removed(db, &graph.id).await
}

pub struct RebuildOutcome {
    pub scope_key: String,
    pub node_count: usize,
    pub edge_count: usize,
}

/// `tags` is the owning context's tags, kept distinct from the node's own `keywords` so
/// the tag-Jaccard and keyword-Jaccard similarity terms score independent signals.
fn node_features(node: &ContextNode, tags: HashSet<String>) -> NodeFeatures {
    NodeFeatures {
        id: node.id.clone(),
        embedding: node.embedding.clone(),
        tags,
        context_type: format!("{:?}", node.chunk_type),
        content: node.content.clone(),
        keywords: node.keywords.iter().cloned().collect(),
    }
}

fn structural_node(node: &ContextNode) -> StructuralNode {
    StructuralNode {
        id: node.id.clone(),
        context_id: node.context_id.clone(),
        parent_node_id: node.parent_node_id.clone(),
        chunk_index: node.chunk_index,
    }
}

fn materialize_similarity_edges(scope: &str, candidates: Vec<CandidateEdge>) -> Vec<GraphEdge> {
    candidates
        .into_iter()
        .filter_map(|c| {
            GraphEdge::new(
                scope.to_string(),
                c.source_id,
                c.target_id,
                EdgeKind::Similar,
                c.weight,
                None,
            )
            .ok()
        })
        .collect()
}

/// `structural_edges` emits sibling pairs at a fixed weight and parent→child pairs at
/// weight `1.0`; distinguish the two by checking which side is a declared parent rather
/// than comparing weights, since a similarity edge could coincidentally land on the same
/// value.
fn materialize_structural_edges(
    scope: &str,
    candidates: Vec<CandidateEdge>,
    structural: &[StructuralNode],
) -> Vec<GraphEdge> {
    let parent_ids: HashSet<&str> = structural
        .iter()
        .filter_map(|n| n.parent_node_id.as_deref())
        .collect();

    candidates
        .into_iter()
        .filter_map(|c| {
            let kind = if parent_ids.contains(c.source_id.as_str()) {
                EdgeKind::ParentOf
            } else {
                EdgeKind::SiblingOf
            };
            GraphEdge::new(scope.to_string(), c.source_id, c.target_id, kind, c.weight, None).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::context_node::ChunkType;
    use uuid::Uuid;

    fn default_params() -> GraphBuildParams {
        GraphBuildParams {
            embedding_dim: 3,
            k_hyperplanes: 12,
            r_neighbor_buckets: 8,
            top_k_edges: 16,
            similarity_threshold: 0.1,
        }
    }

    fn sample_node(context_id: &str, index: u32, embedding: Vec<f32>) -> ContextNode {
        let now = chrono::Utc::now();
        ContextNode {
            id: Uuid::new_v4().to_string(),
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
            title: format!("chunk {index}"),
            summary: String::new(),
            keywords: vec![],
            embedding: Some(embedding),
            embedding_model_version: Some("v1".to_string()),
            needs_reenrichment: false,
        }
    }

    fn sample_context(user_id: &str) -> Context {
        Context::new(
            user_id.to_string(),
            common::storage::types::context::NewContext {
                title: "S".to_string(),
                content: "chunking system performance overview".to_string(),
                context_type: common::storage::types::context::ContextType::Note,
                project_id: None,
                tags: vec!["infra".to_string()],
                source: None,
                metadata: None,
            },
        )
        .expect("valid context input")
    }

    #[tokio::test]
    async fn rebuild_scope_persists_edges_and_marks_graph_ready() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.ensure_initialized(3).await.expect("init schema");

        let context = sample_context("user1");
        let context_id = context.id.clone();
        db.store_item(context).await.expect("store context");

        let nodes = vec![
            sample_node(&context_id, 0, vec![1.0, 0.0, 0.0]),
            sample_node(&context_id, 1, vec![0.99, 0.01, 0.0]),
        ];
        common::storage::types::context_node::ContextNode::upsert_for_context(
            &db,
            &context_id,
            nodes,
        )
        .await
        .expect("upsert nodes");

        let outcome = rebuild_scope(
            &db,
            "user1",
            None,
            &[context_id.clone()],
            default_params(),
        )
        .await
        .expect("rebuild");

        assert_eq!(outcome.node_count, 2);

        let graph = ContextGraph::get_or_create(&db, "user1", None)
            .await
            .expect("graph");
        assert_eq!(graph.state, "Ready");
        assert_eq!(graph.version, 1);
    }

    #[tokio::test]
    async fn add_node_marks_graph_stale_and_appends_node_id() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.ensure_initialized(3).await.expect("init schema");

        let context = sample_context("user1");
        let context_id = context.id.clone();
        db.store_item(context).await.expect("store context");

        let existing = sample_node(&context_id, 0, vec![1.0, 0.0, 0.0]);
        common::storage::types::context_node::ContextNode::upsert_for_context(
            &db,
            &context_id,
            vec![existing],
        )
        .await
        .expect("upsert nodes");

        rebuild_scope(&db, "user1", None, &[context_id.clone()], default_params())
            .await
            .expect("initial build");

        let new_node = sample_node(&context_id, 1, vec![0.98, 0.02, 0.0]);
        let new_node_id = new_node.id.clone();
        add_node(
            &db,
            "user1",
            None,
            &new_node,
            &[context_id.clone()],
            default_params(),
        )
        .await
        .expect("add node");

        let graph = ContextGraph::get_or_create(&db, "user1", None)
            .await
            .expect("graph");
        assert_eq!(graph.state, "Stale");
        assert!(graph.node_ids.contains(&new_node_id));
    }
}
