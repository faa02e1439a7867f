use std::sync::atomic::Ordering;

use common::{
    error::AppError,
    storage::types::{
        context::Context,
        context_graph::ContextGraph,
        context_node::{ChunkType, ContextNode},
    },
    utils::embedding::fallback_embedding,
};
use graph_builder::{add_node, rebuild_scope};
use state_machines::core::GuardError;

use crate::chunker::{self, RegionKind};

use super::context::PipelineContext;
use super::state::{Chunked, Enriched, GraphIntegrated, IngestionMachine, Persisted, Ready};

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::Internal(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}

fn region_kind_to_chunk_type(kind: RegionKind) -> ChunkType {
    match kind {
        RegionKind::CodeFence => ChunkType::Code,
        RegionKind::Heading => ChunkType::Heading,
        RegionKind::List => ChunkType::List,
        RegionKind::Table => ChunkType::Table,
        RegionKind::Paragraph => ChunkType::Paragraph,
        RegionKind::Mixed => ChunkType::Mixed,
    }
}

/// Runs the Smart Chunker over the context's content. Empty content yields zero chunks;
/// the caller is responsible for short-circuiting to a successful no-op in that case.
pub fn chunk_content(
    machine: IngestionMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Chunked>, AppError> {
    ctx.chunks = chunker::chunk(
        &ctx.context.content,
        ctx.config.max_chunk_tokens,
        ctx.config.target_chunk_tokens,
    );
    machine.chunk().map_err(|(_, guard)| map_guard_error("chunk", &guard))
}

/// Embeds and analyzes every chunk with bounded concurrency. Under backpressure (queue
/// depth over `MAX_ENRICH_QUEUE`) or on repeated provider failure, a node is still
/// produced — with a fallback embedding and `needs_reenrichment = true` — rather than
/// failing the whole ingest.
pub async fn enrich_nodes(
    machine: IngestionMachine<(), Chunked>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Enriched>, AppError> {
    let shedding = ctx.queue_depth.load(Ordering::Relaxed) >= ctx.config.max_enrich_queue;
    if shedding {
        tracing::warn!(
            task_id = %ctx.task_id,
            queue_depth = ctx.queue_depth.load(Ordering::Relaxed),
            "enrichment queue over capacity, shedding load for this ingest"
        );
    }

    ctx.queue_depth
        .fetch_add(ctx.chunks.len(), Ordering::Relaxed);

    let mut nodes = Vec::with_capacity(ctx.chunks.len());
    for chunk in &ctx.chunks {
        let node = if shedding {
            fallback_node(ctx, chunk)
        } else {
            enrich_one(ctx, chunk).await
        };
        nodes.push(node);
    }

    ctx.queue_depth
        .fetch_sub(ctx.chunks.len(), Ordering::Relaxed);
    ctx.nodes = nodes;
    machine.enrich().map_err(|(_, guard)| map_guard_error("enrich", &guard))
}

async fn enrich_one(ctx: &PipelineContext<'_>, chunk: &chunker::Chunk) -> ContextNode {
    let embedding_result = ctx.enricher.embed_one(&chunk.content).await;

    let analysis = ctx
        .enricher
        .analyze_node(&chunk.content, &format!("{:?}", chunk.chunk_type))
        .await
        .ok();

    let needs_reenrichment = embedding_result.is_fallback || analysis.is_none();

    let title = analysis
        .as_ref()
        .map(|a| a.title.clone())
        .unwrap_or_else(|| default_title(chunk));
    let summary = analysis
        .as_ref()
        .map(|a| a.summary.clone())
        .unwrap_or_default();
    let keywords = analysis.as_ref().map(|a| a.keywords.clone()).unwrap_or_default();
    let importance = analysis
        .as_ref()
        .and_then(|a| a.importance)
        .unwrap_or(chunk.importance);

    let summary = if chunk.heading_path.is_empty() {
        summary
    } else {
        format!("{} > {}", chunk.heading_path, summary)
    };

    build_node(
        ctx,
        chunk,
        title,
        summary,
        keywords,
        importance,
        embedding_result.vector,
        needs_reenrichment,
    )
}

fn fallback_node(ctx: &PipelineContext<'_>, chunk: &chunker::Chunk) -> ContextNode {
    let vector = fallback_embedding(&chunk.content, ctx.config.embedding_dim);
    let summary = if chunk.heading_path.is_empty() {
        String::new()
    } else {
        chunk.heading_path.clone()
    };
    build_node(
        ctx,
        chunk,
        default_title(chunk),
        summary,
        Vec::new(),
        chunk.importance,
        vector,
        true,
    )
}

fn default_title(chunk: &chunker::Chunk) -> String {
    chunk.content.chars().take(80).collect()
}

#[allow(clippy::too_many_arguments)]
fn build_node(
    ctx: &PipelineContext<'_>,
    chunk: &chunker::Chunk,
    title: String,
    summary: String,
    keywords: Vec<String>,
    importance: f32,
    embedding: Vec<f32>,
    needs_reenrichment: bool,
) -> ContextNode {
    let now = chrono::Utc::now();
    ContextNode {
        id: uuid::Uuid::new_v4().to_string(),
        created_at: now,
        updated_at: now,
        context_id: ctx.context.id.clone(),
        parent_node_id: None,
        child_node_ids: Vec::new(),
        content: chunk.content.clone(),
        token_count: chunk.token_count,
        chunk_type: region_kind_to_chunk_type(chunk.chunk_type),
        chunk_index: chunk.chunk_index,
        importance,
        title,
        summary,
        keywords,
        embedding: Some(embedding),
        embedding_model_version: Some(ctx.config.embedding_model_version.clone()),
        needs_reenrichment,
    }
}

/// Atomically replaces every node belonging to this context and updates its chunk count.
pub async fn persist_nodes(
    machine: IngestionMachine<(), Enriched>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Persisted>, AppError> {
    ContextNode::upsert_for_context(ctx.db, &ctx.context.id, ctx.nodes.clone()).await?;
    Context::set_chunk_count(ctx.db, &ctx.context.id, ctx.nodes.len() as u32).await?;
    machine.persist().map_err(|(_, guard)| map_guard_error("persist", &guard))
}

/// Every `REBUILD_EVERY_N_VERSIONS`-th ingest into a scope pays for a full
/// similarity/structural recompute; every other ingest only scores the new node against
/// the scope's existing nodes and persists the resulting edges.
const REBUILD_EVERY_N_VERSIONS: u64 = 20;

/// Maintains the owning scope's similarity/structural graph for the nodes just persisted:
/// incrementally by default, falling back to a full [`rebuild_scope`] on a periodic
/// cadence so drift from skipped top-k recomputation and LSH bucket rebalancing doesn't
/// accumulate forever.
pub async fn integrate_graph(
    machine: IngestionMachine<(), Persisted>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), GraphIntegrated>, AppError> {
    if ctx.nodes.is_empty() {
        return machine
            .integrate_graph()
            .map_err(|(_, guard)| map_guard_error("integrate_graph", &guard));
    }

    let mut other_context_ids = Vec::new();
    let mut cursor = None;
    loop {
        let page = Context::list(
            ctx.db,
            &ctx.context.user_id,
            ctx.context.project_id.as_deref(),
            200,
            cursor.clone(),
        )
        .await?;
        for other in &page.items {
            if other.id != ctx.context.id {
                other_context_ids.push(other.id.clone());
            }
        }
        match page.next_cursor {
            Some(raw) => cursor = parse_cursor(&raw),
            None => break,
        }
        if cursor.is_none() {
            break;
        }
    }

    let graph = ContextGraph::get_or_create(
        ctx.db,
        &ctx.context.user_id,
        ctx.context.project_id.as_deref(),
    )
    .await?;
    let due_for_full_rebuild =
        graph.state == "Empty" || graph.version % REBUILD_EVERY_N_VERSIONS == 0;

    if due_for_full_rebuild {
        let mut context_ids = other_context_ids;
        context_ids.push(ctx.context.id.clone());
        rebuild_scope(
            ctx.db,
            &ctx.context.user_id,
            ctx.context.project_id.as_deref(),
            &context_ids,
            ctx.config.graph_build_params(),
        )
        .await?;
    } else {
        for node in &ctx.nodes {
            add_node(
                ctx.db,
                &ctx.context.user_id,
                ctx.context.project_id.as_deref(),
                node,
                &other_context_ids,
                ctx.config.graph_build_params(),
            )
            .await?;
        }
    }

    machine
        .integrate_graph()
        .map_err(|(_, guard)| map_guard_error("integrate_graph", &guard))
}

fn parse_cursor(raw: &str) -> Option<(chrono::DateTime<chrono::Utc>, String)> {
    let (ts, id) = raw.split_once('|')?;
    let parsed = chrono::DateTime::parse_from_rfc3339(ts).ok()?;
    Some((parsed.with_timezone(&chrono::Utc), id.to_string()))
}
