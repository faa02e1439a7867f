use api_state::ApiState;
use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use routes::{
    contexts::{
        analyze_context, create_context, delete_context, get_context, get_context_graph,
        list_contexts,
    },
    health::health,
    rag,
    search::{build_context_window, search_graph, search_hybrid, search_semantic, search_text},
};

pub mod api_state;
pub mod envelope;
pub mod error;
pub mod extract;
mod routes;

#[cfg(test)]
mod test_support;

/// Router for API functionality, version 1.
pub fn api_routes_v1<S>(_app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route("/health", get(health))
        .route("/contexts", post(create_context).get(list_contexts))
        .route("/contexts/{id}", get(get_context).delete(delete_context))
        .route("/contexts/{id}/analyze", post(analyze_context))
        .route("/contexts/{id}/graph", get(get_context_graph))
        .route("/search/text", post(search_text))
        .route("/search/semantic", post(search_semantic))
        .route("/search/hybrid", post(search_hybrid))
        .route("/search/graph", post(search_graph))
        .route("/search/context-window", post(build_context_window))
        .route("/rag/generate", post(rag::generate))
}
