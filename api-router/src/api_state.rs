use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use common::{storage::db::SurrealDbClient, utils::config::AppConfig};
use ingestion_pipeline::{enricher::AiEnricher, IngestionConfig, IngestionPipeline};
use retrieval_pipeline::{pipeline::RetrievalConfig, SearchEngine};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub engine: Arc<SearchEngine>,
    pub ingestion: Arc<IngestionPipeline>,
}

impl ApiState {
    pub async fn new(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
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

        let engine = Arc::new(SearchEngine::new(
            db.clone(),
            enricher.clone(),
            RetrievalConfig::from(config),
        ));
        let ingestion = Arc::new(IngestionPipeline::new(
            db.clone(),
            enricher,
            IngestionConfig::from(config),
        ));

        Ok(Self {
            db,
            config: config.clone(),
            engine,
            ingestion,
        })
    }
}
