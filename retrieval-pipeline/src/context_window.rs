//! ContextWindow assembly: re-scores a ranked candidate set by the requested priority,
//! then greedily packs it under a hard token budget while preserving each context's
//! internal chunk order.

use std::collections::HashMap;

use chrono::Utc;
use common::storage::types::context_node::ScoredNode;
use ingestion_pipeline::chunker::estimate_tokens;
use serde::Serialize;

use crate::scoring::min_max_normalize;

/// How re-scored priority is computed before the knapsack pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPriority {
    Relevance,
    Recency,
    Importance,
    Mixed,
}

/// Half-life used by the recency decay curve. Not named explicitly by the retrieval
/// contract, so chosen to keep same-week content close to full weight while still
/// separating it from month-old content.
const RECENCY_HALF_LIFE_DAYS: f64 = 7.0;

#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub include_metadata: bool,
    pub preserve_structure: bool,
    pub add_separators: bool,
    pub priority: WindowPriority,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            include_metadata: false,
            preserve_structure: true,
            add_separators: true,
            priority: WindowPriority::Relevance,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextWindow {
    pub text: String,
    pub total_tokens: u32,
    pub coverage: f64,
    pub node_ids: Vec<String>,
}

/// Assembles a [`ContextWindow`] from `candidates`, never exceeding `max_tokens`.
pub fn build_context_window(
    candidates: Vec<ScoredNode>,
    max_tokens: u32,
    options: &WindowOptions,
) -> ContextWindow {
    if candidates.is_empty() {
        return ContextWindow {
            text: String::new(),
            total_tokens: 0,
            coverage: 0.0,
            node_ids: Vec::new(),
        };
    }

    let candidate_token_sum: u64 = candidates.iter().map(|c| u64::from(c.node.token_count)).sum();
    let priorities = rescore(&candidates, options.priority);

    let separator_cost = if options.add_separators { 1 } else { 0 };

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        let ratio_a = priorities[a] / (candidates[a].node.token_count.max(1) as f32);
        let ratio_b = priorities[b] / (candidates[b].node.token_count.max(1) as f32);
        ratio_b
            .partial_cmp(&ratio_a)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut selected_indices = Vec::new();
    let mut running_tokens: u32 = 0;
    let mut selected_content_tokens: u64 = 0;
    for &idx in &order {
        let node = &candidates[idx].node;
        let header_cost = if options.include_metadata {
            estimate_tokens(&metadata_header(node))
        } else {
            0
        };
        let cost = node.token_count + header_cost + separator_cost;
        if running_tokens + cost > max_tokens {
            continue;
        }
        running_tokens += cost;
        selected_content_tokens += u64::from(node.token_count);
        selected_indices.push(idx);
    }

    // Preserve each context's internal chunk_index order; keep context groups ordered by
    // the best-ranked node that pulled them into the window.
    let mut first_rank: HashMap<&str, usize> = HashMap::new();
    for (rank, &idx) in selected_indices.iter().enumerate() {
        first_rank
            .entry(candidates[idx].node.context_id.as_str())
            .or_insert(rank);
    }
    selected_indices.sort_by_key(|&idx| {
        let node = &candidates[idx].node;
        (first_rank[node.context_id.as_str()], node.chunk_index)
    });

    let mut text = String::new();
    let mut node_ids = Vec::with_capacity(selected_indices.len());
    for (i, &idx) in selected_indices.iter().enumerate() {
        let node = &candidates[idx].node;
        if i > 0 && options.add_separators {
            text.push_str("\n\n");
        }
        if options.include_metadata {
            text.push_str(&metadata_header(node));
            text.push('\n');
        }
        text.push_str(&node.content);
        node_ids.push(node.id.clone());
    }

    let coverage = if candidate_token_sum == 0 {
        0.0
    } else {
        (selected_content_tokens as f64 / candidate_token_sum as f64).min(1.0)
    };

    ContextWindow {
        text,
        total_tokens: running_tokens,
        coverage,
        node_ids,
    }
}

fn metadata_header(node: &common::storage::types::context_node::ContextNode) -> String {
    format!(
        "[{} | {:?} | {}]",
        node.title,
        node.chunk_type,
        node.created_at.to_rfc3339()
    )
}

fn rescore(candidates: &[ScoredNode], priority: WindowPriority) -> Vec<f32> {
    let relevance = min_max_normalize(
        &candidates.iter().map(|c| c.score).collect::<Vec<_>>(),
    );
    match priority {
        WindowPriority::Relevance => relevance,
        WindowPriority::Recency => candidates.iter().map(|c| recency_score(c)).collect(),
        WindowPriority::Importance => candidates.iter().map(|c| c.node.importance).collect(),
        WindowPriority::Mixed => {
            let recency: Vec<f32> = candidates.iter().map(recency_score).collect();
            relevance
                .iter()
                .zip(&recency)
                .zip(candidates.iter())
                .map(|((r, rec), c)| 0.5 * r + 0.25 * rec + 0.25 * c.node.importance)
                .collect()
        }
    }
}

fn recency_score(candidate: &ScoredNode) -> f32 {
    let age_days = (Utc::now() - candidate.node.created_at).num_seconds() as f64 / 86_400.0;
    let age_days = age_days.max(0.0);
    (2f64.powf(-age_days / RECENCY_HALF_LIFE_DAYS)) as f32
}
