use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use ingestion_pipeline::{enricher::AiEnricher, run_worker_loop, IngestionConfig, IngestionPipeline};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized(config.embedding_dim).await?;

    let openai_client = Arc::new(Client::with_config(
        OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
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
    let ingestion_pipeline = Arc::new(IngestionPipeline::new(
        db.clone(),
        enricher,
        IngestionConfig::from(&config),
    ));

    run_worker_loop(db, ingestion_pipeline).await
}
