//! Shared fixtures for route tests: an in-memory [`ApiState`] wired to a fake enricher so
//! handlers can be driven end to end without a live SurrealDB or OpenAI endpoint.

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use common::{storage::db::SurrealDbClient, utils::config::AppConfig};
use ingestion_pipeline::{enricher::AiEnricher, IngestionConfig, IngestionPipeline};
use retrieval_pipeline::{pipeline::config::RetrievalConfig, SearchEngine};

use crate::api_state::ApiState;

pub fn test_config() -> AppConfig {
    AppConfig {
        openai_api_key: String::new(),
        surrealdb_address: String::new(),
        surrealdb_username: String::new(),
        surrealdb_password: String::new(),
        surrealdb_namespace: String::new(),
        surrealdb_database: String::new(),
        http_port: 8080,
        openai_base_url: "https://api.openai.com/v1".to_string(),
        embedding_dim: 8,
        embedding_model_version: "test-v1".to_string(),
        generator_model: "gpt-4o-mini".to_string(),
        embedding_model: "text-embedding-3-small".to_string(),
        max_chunk_tokens: 4000,
        target_chunk_tokens: None,
        similarity_threshold: 0.1,
        edges_per_node_k: 16,
        lsh_hyperplanes: 12,
        lsh_neighbor_buckets: 8,
        p_enrich: 4,
        max_enrich_queue: 10_000,
        chunking_timeout_ms: 2_000,
        embedding_timeout_ms: 1_000,
        analyze_timeout_ms: 1_000,
        generate_timeout_ms: 1_000,
        graph_add_timeout_ms: 1_000,
        rrf_k: 60,
        graph_alpha: 0.7,
        graph_beta: 0.3,
        graph_max_depth: 2,
        factual_grounding_threshold: 0.35,
    }
}

pub async fn test_state() -> ApiState {
    let config = test_config();
    let db = Arc::new(
        SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db"),
    );
    db.ensure_initialized(config.embedding_dim)
        .await
        .expect("init schema");

    let openai_client = Arc::new(async_openai::Client::with_config(
        OpenAIConfig::new().with_api_key("test-key"),
    ));
    let enricher = Arc::new(AiEnricher::new(
        openai_client,
        config.embedding_model.clone(),
        config.generator_model.clone(),
        config.embedding_dim,
        config.embedding_timeout_ms,
        config.analyze_timeout_ms,
        config.generate_timeout_ms,
        config.p_enrich,
    ));
    let engine = Arc::new(SearchEngine::new(
        db.clone(),
        enricher.clone(),
        RetrievalConfig::from(&config),
    ));
    let ingestion = Arc::new(IngestionPipeline::new(
        db.clone(),
        enricher,
        IngestionConfig::from(&config),
    ));

    ApiState {
        db,
        config,
        engine,
        ingestion,
    }
}
