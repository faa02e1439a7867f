use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use common::storage::types::{
    context::{Context, NewContext},
    context_graph::{scope_key, ContextGraph},
    context_node::ContextNode,
    graph_edge::GraphEdge,
    ingestion_task::{IngestionTask, NewContextWire},
};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, envelope::Envelope, error::ApiError, extract::UserContext};

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    #[serde(flatten)]
    pub context: Context,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<ContextNode>>,
}

/// `POST /contexts`: creates a context and enqueues it for ingestion.
pub async fn create_context(
    State(state): State<ApiState>,
    user: UserContext,
    Json(input): Json<NewContextWire>,
) -> Result<(StatusCode, Json<Envelope<Context>>), ApiError> {
    let context = Context::new(user.user_id.clone(), NewContext::from(input))?;
    state.db.store_item(context.clone()).await.map_err(common::error::AppError::from)?;
    IngestionTask::enqueue(&state.db, user.user_id, context.id.clone()).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(context))))
}

#[derive(Debug, Deserialize)]
pub struct GetContextParams {
    #[serde(default)]
    pub include_nodes: bool,
}

/// `GET /contexts/:id?includeNodes=bool`.
pub async fn get_context(
    State(state): State<ApiState>,
    user: UserContext,
    Path(id): Path<String>,
    Query(params): Query<GetContextParams>,
) -> Result<Json<Envelope<ContextResponse>>, ApiError> {
    let context = Context::get(&state.db, &user.user_id, &id).await?;
    let nodes = if params.include_nodes {
        Some(ContextNode::get_for_context(&state.db, &context.id).await?)
    } else {
        None
    };
    Ok(Json(Envelope::ok(ContextResponse { context, nodes })))
}

#[derive(Debug, Deserialize)]
pub struct ListContextsParams {
    pub project_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub cursor: Option<String>,
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Serialize)]
pub struct ListContextsResponse {
    pub items: Vec<Context>,
    pub next_cursor: Option<String>,
}

/// `GET /contexts?projectId=&limit=&cursor=`.
pub async fn list_contexts(
    State(state): State<ApiState>,
    user: UserContext,
    Query(params): Query<ListContextsParams>,
) -> Result<Json<Envelope<ListContextsResponse>>, ApiError> {
    let cursor = params
        .cursor
        .as_deref()
        .map(parse_cursor)
        .transpose()
        .map_err(ApiError::InvalidInput)?;

    let page = Context::list(
        &state.db,
        &user.user_id,
        params.project_id.as_deref(),
        params.limit,
        cursor,
    )
    .await?;

    Ok(Json(Envelope::ok(ListContextsResponse {
        items: page.items,
        next_cursor: page.next_cursor,
    })))
}

fn parse_cursor(raw: &str) -> Result<(DateTime<Utc>, String), String> {
    let (timestamp, id) = raw
        .split_once('|')
        .ok_or_else(|| "malformed cursor".to_string())?;
    let parsed = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| format!("malformed cursor timestamp: {e}"))?
        .with_timezone(&Utc);
    Ok((parsed, id.to_string()))
}

/// `DELETE /contexts/:id`.
pub async fn delete_context(
    State(state): State<ApiState>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    Context::delete(&state.db, &user.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /contexts/:id/analyze`: synchronously drives the context through ingestion again,
/// for callers that need confirmation rather than waiting on the background worker.
pub async fn analyze_context(
    State(state): State<ApiState>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Context>>, ApiError> {
    let context = Context::get(&state.db, &user.user_id, &id).await?;
    let task = IngestionTask::enqueue(&state.db, user.user_id.clone(), context.id.clone()).await?;
    state.ingestion.process_task(&task).await?;
    let reloaded = Context::get(&state.db, &user.user_id, &id).await?;
    Ok(Json(Envelope::ok(reloaded)))
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub nodes: Vec<ContextNode>,
    pub edges: Vec<GraphEdge>,
    pub version: u64,
    pub staleness: bool,
}

/// `GET /contexts/:id/graph`.
pub async fn get_context_graph(
    State(state): State<ApiState>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<Json<Envelope<GraphResponse>>, ApiError> {
    let context = Context::get(&state.db, &user.user_id, &id).await?;
    let scope = scope_key(&user.user_id, context.project_id.as_deref());
    let graph = ContextGraph::get_or_create(&state.db, &user.user_id, context.project_id.as_deref())
        .await?;

    let nodes = ContextNode::get_for_context(&state.db, &context.id).await?;
    let node_ids: std::collections::HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    let all_edges = GraphEdge::for_scope(&state.db, &scope).await?;
    let edges: Vec<GraphEdge> = all_edges
        .into_iter()
        .filter(|e| node_ids.contains(e.source_id.as_str()) || node_ids.contains(e.target_id.as_str()))
        .collect();

    Ok(Json(Envelope::ok(GraphResponse {
        nodes,
        edges,
        version: graph.version,
        staleness: graph.state != "Ready",
    })))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        routing::{get, post},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::test_state;

    fn app(state: ApiState) -> Router {
        Router::new()
            .route("/contexts", post(create_context).get(list_contexts))
            .route("/contexts/{id}", get(get_context).delete(delete_context))
            .with_state(state)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_then_fetch_a_context() {
        let app = app(test_state().await);

        let create = Request::builder()
            .method(Method::POST)
            .uri("/contexts")
            .header("content-type", "application/json")
            .header("x-user-id", "user1")
            .body(Body::from(
                json!({
                    "title": "Notes",
                    "content": "hello world",
                    "context_type": "Documentation",
                    "project_id": null,
                    "tags": [],
                    "metadata": null,
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(create).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let fetch = Request::builder()
            .method(Method::GET)
            .uri(format!("/contexts/{id}"))
            .header("x-user-id", "user1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(fetch).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = body_json(response).await;
        assert_eq!(fetched["data"]["id"], json!(id));
    }

    #[tokio::test]
    async fn missing_user_header_is_unauthorized() {
        let app = app(test_state().await);
        let request = Request::builder()
            .method(Method::GET)
            .uri("/contexts/does-not-exist")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn fetching_another_users_context_is_forbidden() {
        let state = test_state().await;
        let app = app(state.clone());

        let create = Request::builder()
            .method(Method::POST)
            .uri("/contexts")
            .header("content-type", "application/json")
            .header("x-user-id", "owner")
            .body(Body::from(
                json!({
                    "title": "Notes",
                    "content": "hello world",
                    "context_type": "Documentation",
                    "project_id": null,
                    "tags": [],
                    "metadata": null,
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(create).await.unwrap();
        let created = body_json(response).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let fetch = Request::builder()
            .method(Method::GET)
            .uri(format!("/contexts/{id}"))
            .header("x-user-id", "intruder")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(fetch).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
