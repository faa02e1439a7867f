//! Retrieval-augmented answer generation: analyze the prompt's intent, gather candidate
//! chunks (Hybrid, or Graph when a seed context is given), pack a context window sized to
//! the intent, generate an answer grounded in that window, then validate the result.

use std::collections::HashSet;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::context_node::ScoredNode},
};
use ingestion_pipeline::enricher::AiEnricher;
use serde::Serialize;

use crate::{
    context_window::{build_context_window, ContextWindow, WindowOptions, WindowPriority},
    fts, graph,
    pipeline::config::RetrievalConfig,
    scoring::reciprocal_rank_fusion,
    semantic,
};

#[derive(Debug, Clone, Default)]
pub struct RagOptions {
    pub seed_context_id: Option<String>,
    pub project_id: Option<String>,
    pub max_tokens: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub factual_grounding: f32,
    pub has_citation: bool,
    pub hedging_balance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HallucinationDetection {
    pub suspected: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RagResult {
    pub answer: Option<String>,
    pub confidence: f32,
    pub source_node_ids: Vec<String>,
    pub validation: Option<Validation>,
    pub hallucination_detection: Option<HallucinationDetection>,
    pub reason: Option<String>,
    pub context_window: ContextWindow,
}

const HEDGING_PHRASES: &[&str] = &[
    "might", "may", "could", "possibly", "likely", "perhaps", "it seems", "i'm not sure",
    "it's unclear", "appears to",
];

/// `Hybrid(query, limit)`: hybrid-fuses [`fts::search_text`] and
/// [`semantic::search_semantic`] rankings via reciprocal rank fusion.
pub async fn search_hybrid(
    db: &SurrealDbClient,
    enricher: &AiEnricher,
    config: &RetrievalConfig,
    user_id: &str,
    context_id: Option<&str>,
    query: &str,
    limit: u32,
) -> Result<Vec<ScoredNode>, AppError> {
    let text_results = fts::search_text(db, user_id, query, context_id, limit).await?;
    let semantic_outcome =
        semantic::search_semantic(db, enricher, user_id, query, context_id, limit).await?;
    let semantic_results = semantic_outcome.into_nodes();

    let rankings = vec![
        text_results.iter().map(|n| n.node.id.clone()).collect(),
        semantic_results.iter().map(|n| n.node.id.clone()).collect(),
    ];
    let fused = reciprocal_rank_fusion(&rankings, config.rrf_k);

    let mut by_id: std::collections::HashMap<String, ScoredNode> = std::collections::HashMap::new();
    for node in text_results.into_iter().chain(semantic_results) {
        by_id.entry(node.node.id.clone()).or_insert(node);
    }

    let mut scored: Vec<ScoredNode> = fused
        .into_iter()
        .filter_map(|(id, score)| {
            by_id.remove(&id).map(|mut node| {
                node.score = score;
                node
            })
        })
        .collect();
    scored.truncate(limit as usize);
    Ok(scored)
}

/// `RAG(query, options) -> {answer, confidence, sourceNodeIds, validation, hallucinationDetection}`.
pub async fn generate(
    db: &SurrealDbClient,
    enricher: &AiEnricher,
    config: &RetrievalConfig,
    user_id: &str,
    query: &str,
    options: &RagOptions,
) -> Result<RagResult, AppError> {
    let analysis = match enricher.analyze_prompt(query).await {
        Ok(analysis) => Some(analysis),
        Err(err) => {
            tracing::warn!(error = %err, "prompt analysis unavailable, assuming non-factual intent");
            None
        }
    };
    let is_factual = analysis.as_ref().is_some_and(|a| a.is_factual);

    let candidates = match &options.seed_context_id {
        Some(seed) => {
            let outcome = graph::search_graph(
                db,
                enricher,
                user_id,
                options.project_id.as_deref(),
                query,
                seed,
                options.limit,
                config.graph_max_depth,
                config.graph_alpha,
                config.graph_beta,
            )
            .await?;
            outcome.into_nodes()
        }
        None => search_hybrid(db, enricher, config, user_id, None, query, options.limit).await?,
    };

    let intent = analysis.as_ref().map_or("", |a| a.intent.as_str());
    let priority = priority_for(intent, is_factual);
    let window = build_context_window(
        candidates,
        options.max_tokens,
        &WindowOptions {
            include_metadata: true,
            priority,
            ..Default::default()
        },
    );

    if window.node_ids.is_empty() {
        return Ok(RagResult {
            answer: None,
            confidence: 0.0,
            source_node_ids: Vec::new(),
            validation: None,
            hallucination_detection: None,
            reason: Some("no_candidates".to_string()),
            context_window: window,
        });
    }

    match enricher.generate_answer(query, &window.text).await {
        Ok(generated) => {
            let validation = validate(&generated.text, &window, is_factual, config);
            let hallucination_detection = Some(HallucinationDetection {
                suspected: validation.factual_grounding < config.factual_grounding_threshold,
                reason: (validation.factual_grounding < config.factual_grounding_threshold)
                    .then(|| "low factual grounding against retrieved context".to_string()),
            });
            let confidence = clamp_unit(
                0.5 * validation.factual_grounding
                    + 0.3 * f32::from(validation.has_citation)
                    + 0.2 * validation.hedging_balance,
            );
            Ok(RagResult {
                answer: Some(generated.text),
                confidence,
                source_node_ids: window.node_ids.clone(),
                validation: Some(validation),
                hallucination_detection,
                reason: None,
                context_window: window,
            })
        }
        Err(err) => {
            tracing::warn!(error = %err, "answer generation unavailable after retries");
            Ok(RagResult {
                answer: None,
                confidence: 0.0,
                source_node_ids: window.node_ids.clone(),
                validation: None,
                hallucination_detection: None,
                reason: Some("generator_unavailable".to_string()),
                context_window: window,
            })
        }
    }
}

/// Recall-style intents ("what was discussed last week") want recency over pure
/// relevance; debugging/how-to intents are factual and want relevance; everything else
/// stays a balanced mix.
const RECALL_INTENT_MARKERS: &[&str] = &[
    "what was discussed",
    "what did we",
    "recall",
    "remind me",
    "earlier conversation",
    "previous conversation",
    "chat history",
];

fn priority_for(intent: &str, is_factual: bool) -> WindowPriority {
    let lower = intent.to_lowercase();
    if RECALL_INTENT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        WindowPriority::Recency
    } else if is_factual || lower.contains("debug") || lower.contains("how_to") || lower.contains("how-to") {
        WindowPriority::Relevance
    } else {
        WindowPriority::Mixed
    }
}

fn validate(
    answer: &str,
    window: &ContextWindow,
    is_factual: bool,
    config: &RetrievalConfig,
) -> Validation {
    let factual_grounding = trigram_overlap(answer, &window.text);
    let has_citation = !is_factual || window_titles_cited(answer, window);
    let hedging_balance = hedging_balance(answer);
    let _ = config;
    Validation {
        factual_grounding,
        has_citation,
        hedging_balance,
    }
}

fn window_titles_cited(answer: &str, window: &ContextWindow) -> bool {
    let lower = answer.to_lowercase();
    window
        .text
        .lines()
        .filter(|l| l.starts_with('['))
        .any(|header| {
            header
                .trim_start_matches('[')
                .split('|')
                .next()
                .map(|title| lower.contains(&title.trim().to_lowercase()))
                .unwrap_or(false)
        })
}

fn hedging_balance(answer: &str) -> f32 {
    let sentences: Vec<&str> = answer
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return 1.0;
    }
    let lower = answer.to_lowercase();
    let hedged = HEDGING_PHRASES.iter().filter(|p| lower.contains(*p)).count();
    clamp_unit(1.0 - (hedged as f32 / sentences.len() as f32))
}

/// Trigram Jaccard overlap between the answer and the context it was grounded in, used as
/// the factual grounding signal.
fn trigram_overlap(answer: &str, context: &str) -> f32 {
    let answer_grams = word_trigrams(answer);
    let context_grams = word_trigrams(context);
    if answer_grams.is_empty() {
        return 0.0;
    }
    let overlap = answer_grams.intersection(&context_grams).count();
    overlap as f32 / answer_grams.len() as f32
}

fn word_trigrams(text: &str) -> HashSet<String> {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() < 3 {
        return words.into_iter().collect();
    }
    words
        .windows(3)
        .map(|w| w.join(" "))
        .collect()
}

fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}
