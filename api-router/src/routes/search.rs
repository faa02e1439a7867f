use axum::{extract::State, Json};
use common::storage::types::context_node::ScoredNode;
use retrieval_pipeline::{
    context_window::{ContextWindow, WindowOptions, WindowPriority},
    pipeline::SearchMode,
};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, envelope::Envelope, error::ApiError, extract::UserContext};

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredNode>,
    pub mode: &'static str,
    pub degraded: bool,
    pub timings: SearchTimings,
}

#[derive(Debug, Serialize)]
pub struct SearchTimings {
    pub total_ms: u128,
}

fn mode_name(mode: SearchMode) -> &'static str {
    match mode {
        SearchMode::Text => "text",
        SearchMode::Semantic => "semantic",
        SearchMode::Hybrid => "hybrid",
        SearchMode::Graph => "graph",
    }
}

/// `POST /search/text`.
pub async fn search_text(
    State(state): State<ApiState>,
    user: UserContext,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Envelope<SearchResponse>>, ApiError> {
    let start = std::time::Instant::now();
    let outcome = state
        .engine
        .search_text(&user.user_id, &req.query, req.context_id.as_deref(), req.limit)
        .await?;
    Ok(Json(Envelope::ok(SearchResponse {
        mode: mode_name(outcome.mode),
        degraded: outcome.degraded,
        results: outcome.results,
        timings: SearchTimings {
            total_ms: start.elapsed().as_millis(),
        },
    })))
}

/// `POST /search/semantic`.
pub async fn search_semantic(
    State(state): State<ApiState>,
    user: UserContext,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Envelope<SearchResponse>>, ApiError> {
    let start = std::time::Instant::now();
    let outcome = state
        .engine
        .search_semantic(&user.user_id, &req.query, req.context_id.as_deref(), req.limit)
        .await?;
    Ok(Json(Envelope::ok(SearchResponse {
        mode: mode_name(outcome.mode),
        degraded: outcome.degraded,
        results: outcome.results,
        timings: SearchTimings {
            total_ms: start.elapsed().as_millis(),
        },
    })))
}

/// `POST /search/hybrid`.
pub async fn search_hybrid(
    State(state): State<ApiState>,
    user: UserContext,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Envelope<SearchResponse>>, ApiError> {
    let start = std::time::Instant::now();
    let outcome = state
        .engine
        .search_hybrid(&user.user_id, &req.query, req.context_id.as_deref(), req.limit)
        .await?;
    Ok(Json(Envelope::ok(SearchResponse {
        mode: mode_name(outcome.mode),
        degraded: outcome.degraded,
        results: outcome.results,
        timings: SearchTimings {
            total_ms: start.elapsed().as_millis(),
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct GraphSearchRequest {
    pub query: String,
    pub seed_context_id: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// `POST /search/graph`.
pub async fn search_graph(
    State(state): State<ApiState>,
    user: UserContext,
    Json(req): Json<GraphSearchRequest>,
) -> Result<Json<Envelope<SearchResponse>>, ApiError> {
    let start = std::time::Instant::now();
    let outcome = state
        .engine
        .search_graph(
            &user.user_id,
            user.project_id.as_deref(),
            &req.query,
            &req.seed_context_id,
            req.limit,
        )
        .await?;
    Ok(Json(Envelope::ok(SearchResponse {
        mode: mode_name(outcome.mode),
        degraded: outcome.degraded,
        results: outcome.results,
        timings: SearchTimings {
            total_ms: start.elapsed().as_millis(),
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct ContextWindowRequest {
    pub query: String,
    pub node_ids: Vec<String>,
    pub max_tokens: u32,
    #[serde(default)]
    pub options: ContextWindowRequestOptions,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContextWindowRequestOptions {
    #[serde(default)]
    pub include_metadata: bool,
    #[serde(default)]
    pub add_separators: bool,
    #[serde(default)]
    pub priority: Option<String>,
}

fn parse_priority(raw: Option<&str>) -> WindowPriority {
    match raw {
        Some("recency") => WindowPriority::Recency,
        Some("importance") => WindowPriority::Importance,
        Some("mixed") => WindowPriority::Mixed,
        _ => WindowPriority::Relevance,
    }
}

#[derive(Debug, Serialize)]
pub struct ContextWindowResponse {
    pub context_window: ContextWindow,
}

/// `POST /search/context-window`: re-fetches `nodeIds` as a hybrid-scored candidate set
/// (so unscored direct node picks still carry a relevance signal) and packs them.
pub async fn build_context_window(
    State(state): State<ApiState>,
    user: UserContext,
    Json(req): Json<ContextWindowRequest>,
) -> Result<Json<Envelope<ContextWindowResponse>>, ApiError> {
    let outcome = state
        .engine
        .search_hybrid(&user.user_id, &req.query, None, req.node_ids.len().max(1) as u32 * 4)
        .await?;
    let wanted: std::collections::HashSet<&str> = req.node_ids.iter().map(String::as_str).collect();
    let candidates = outcome
        .results
        .into_iter()
        .filter(|c| wanted.contains(c.node.id.as_str()))
        .collect::<Vec<_>>();

    let window = state.engine.build_context_window(
        candidates,
        req.max_tokens,
        &WindowOptions {
            include_metadata: req.options.include_metadata,
            add_separators: req.options.add_separators,
            priority: parse_priority(req.options.priority.as_deref()),
            ..Default::default()
        },
    );

    Ok(Json(Envelope::ok(ContextWindowResponse {
        context_window: window,
    })))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::post,
        Router,
    };
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::test_state;

    #[tokio::test]
    async fn search_text_on_an_empty_store_returns_no_results() {
        let app = Router::new()
            .route("/search/text", post(search_text))
            .with_state(test_state().await);

        let request = Request::builder()
            .method("POST")
            .uri("/search/text")
            .header("content-type", "application/json")
            .header("x-user-id", "user1")
            .body(Body::from(json!({"query": "anything"}).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["results"], json!([]));
        assert_eq!(body["data"]["mode"], json!("text"));
    }

    #[test]
    fn mode_name_covers_every_search_mode() {
        assert_eq!(mode_name(SearchMode::Text), "text");
        assert_eq!(mode_name(SearchMode::Semantic), "semantic");
        assert_eq!(mode_name(SearchMode::Hybrid), "hybrid");
        assert_eq!(mode_name(SearchMode::Graph), "graph");
    }
}
