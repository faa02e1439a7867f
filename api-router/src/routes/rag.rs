use axum::{extract::State, Json};
use retrieval_pipeline::{
    answer_retrieval::{HallucinationDetection, RagOptions, Validation},
    context_window::ContextWindow,
};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, envelope::Envelope, error::ApiError, extract::UserContext};

fn default_max_tokens() -> u32 {
    4000
}

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct RagRequest {
    pub query: String,
    #[serde(default)]
    pub seed_context_id: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Serialize)]
pub struct RagResponse {
    pub answer: Option<String>,
    pub confidence: f32,
    pub source_node_ids: Vec<String>,
    pub validation: Option<Validation>,
    pub hallucination_detection: Option<HallucinationDetection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub context_window: ContextWindow,
}

/// `POST /rag/generate`. Degrades to a window-only response (`answer: null`,
/// `reason: "generator_unavailable"`) when the generator fails after retries.
pub async fn generate(
    State(state): State<ApiState>,
    user: UserContext,
    Json(req): Json<RagRequest>,
) -> Result<Json<Envelope<RagResponse>>, ApiError> {
    let options = RagOptions {
        seed_context_id: req.seed_context_id,
        project_id: user.project_id.clone(),
        max_tokens: req.max_tokens,
        limit: req.limit,
    };
    let result = state
        .engine
        .generate_answer(&user.user_id, &req.query, &options)
        .await?;

    Ok(Json(Envelope::ok(RagResponse {
        answer: result.answer,
        confidence: result.confidence,
        source_node_ids: result.source_node_ids,
        validation: result.validation,
        hallucination_detection: result.hallucination_detection,
        reason: result.reason,
        context_window: result.context_window,
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
    async fn generate_with_no_candidates_degrades_instead_of_erroring() {
        let app = Router::new()
            .route("/rag/generate", post(generate))
            .with_state(test_state().await);

        let request = Request::builder()
            .method("POST")
            .uri("/rag/generate")
            .header("content-type", "application/json")
            .header("x-user-id", "user1")
            .body(Body::from(json!({"query": "what happened?"}).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["answer"], json!(null));
        assert_eq!(body["data"]["reason"], json!("no_candidates"));
    }
}
