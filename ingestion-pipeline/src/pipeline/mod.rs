mod config;
mod context;
mod stages;
mod state;

pub use config::IngestionConfig;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            context::Context,
            ingestion_task::{IngestionTask, IngestionTaskStatus, MAX_ATTEMPTS},
        },
    },
};
use tracing::{debug, info, warn};

use crate::enricher::AiEnricher;

use self::context::PipelineContext;
use self::stages::{chunk_content, enrich_nodes, integrate_graph, persist_nodes};
use self::state::ready;

/// Drives one ingestion task through chunking, enrichment, persistence, and graph
/// integration, recording per-stage timings and handling retry/dead-letter bookkeeping
/// on the task store.
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    enricher: Arc<AiEnricher>,
    config: IngestionConfig,
    queue_depth: AtomicUsize,
}

impl IngestionPipeline {
    pub fn new(db: Arc<SurrealDbClient>, enricher: Arc<AiEnricher>, config: IngestionConfig) -> Self {
        Self {
            db,
            enricher,
            config,
            queue_depth: AtomicUsize::new(0),
        }
    }

    #[tracing::instrument(skip_all, fields(task_id = %task.id, user_id = %task.user_id))]
    pub async fn process_task(&self, task: &IngestionTask) -> Result<(), AppError> {
        match self.drive_pipeline(task).await {
            Ok(()) => {
                IngestionTask::mark_succeeded(&self.db, &task.id).await?;
                info!(task_id = %task.id, "ingestion task succeeded");
                Ok(())
            }
            Err(err) => {
                let reason = err.to_string();
                debug!(task_id = %task.id, error = %reason, "ingestion task failed");

                let attempts = match &task.status {
                    IngestionTaskStatus::InProgress { attempts, .. } => *attempts,
                    _ => 1,
                };

                if attempts < MAX_ATTEMPTS {
                    let delay = self.config.retry.delay_secs(attempts);
                    IngestionTask::requeue_with_delay(&self.db, &task.id, attempts, delay).await?;
                    warn!(
                        task_id = %task.id,
                        error = %reason,
                        attempts,
                        delay_secs = delay,
                        "ingestion task failed, requeued with backoff"
                    );
                } else {
                    IngestionTask::mark_failed(&self.db, &task.id, reason.clone()).await?;
                    warn!(
                        task_id = %task.id,
                        error = %reason,
                        attempts,
                        "ingestion task marked failed after exhausting retries"
                    );
                }

                Err(err)
            }
        }
    }

    async fn drive_pipeline(&self, task: &IngestionTask) -> Result<(), AppError> {
        let context = Context::get(&self.db, &task.user_id, &task.context_id).await?;
        let mut ctx = PipelineContext::new(
            task.id.clone(),
            self.db.as_ref(),
            &self.config,
            self.enricher.as_ref(),
            &self.queue_depth,
            context,
        );

        let pipeline_started = Instant::now();
        let machine = ready();

        let stage_start = Instant::now();
        let machine = chunk_content(machine, &mut ctx).map_err(|err| ctx.abort(err))?;
        let chunk_ms = duration_millis(stage_start.elapsed());

        if ctx.chunks.is_empty() {
            Context::set_chunk_count(&self.db, &ctx.context.id, 0).await?;
            info!(task_id = %ctx.task_id, "ingestion produced zero chunks for empty content");
            return Ok(());
        }

        let stage_start = Instant::now();
        let machine = enrich_nodes(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let enrich_ms = duration_millis(stage_start.elapsed());

        let stage_start = Instant::now();
        let machine = persist_nodes(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let persist_ms = duration_millis(stage_start.elapsed());

        let stage_start = Instant::now();
        let _machine = integrate_graph(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let graph_ms = duration_millis(stage_start.elapsed());

        info!(
            task_id = %ctx.task_id,
            total_ms = duration_millis(pipeline_started.elapsed()),
            chunk_ms,
            enrich_ms,
            persist_ms,
            graph_ms,
            node_count = ctx.nodes.len(),
            "ingestion pipeline finished"
        );

        Ok(())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::config::OpenAIConfig;
    use common::storage::types::context::ContextType;
    use common::storage::types::ingestion_task::IngestionTask;

    fn test_config() -> IngestionConfig {
        let app_config = common_test_config();
        IngestionConfig::from(&app_config)
    }

    fn test_enricher() -> Arc<AiEnricher> {
        let client = Arc::new(async_openai::Client::with_config(
            OpenAIConfig::new().with_api_key("test-key"),
        ));
        Arc::new(AiEnricher::new(
            client,
            "text-embedding-3-small".to_string(),
            "gpt-4o-mini".to_string(),
            8,
            1_000,
            1_000,
            1_000,
            4,
        ))
    }

    fn common_test_config() -> common::utils::config::AppConfig {
        common::utils::config::AppConfig {
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

    /// `Context::new` itself rejects empty content, but the chunker's own "never fails"
    /// contract must still hold for rows that reach storage some other way (a future
    /// import path, a manual fixup). Construct one directly to exercise that path.
    #[tokio::test]
    async fn zero_chunk_content_short_circuits_without_enrichment() {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
                .await
                .expect("memory db"),
        );
        db.ensure_initialized(8).await.expect("init schema");

        let now = chrono::Utc::now();
        let context = Context {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id: "user1".to_string(),
            project_id: None,
            title: "blank".to_string(),
            content: "   \n  ".to_string(),
            context_type: ContextType::Note,
            source: None,
            tags: vec![],
            metadata: None,
            chunk_count: 0,
            has_nodes: false,
        };
        db.store_item(context.clone()).await.expect("store context");

        let task = IngestionTask::enqueue(&db, "user1".to_string(), context.id.clone())
            .await
            .expect("enqueue");

        let pipeline = IngestionPipeline::new(db.clone(), test_enricher(), test_config());
        pipeline.process_task(&task).await.expect("process_task");

        let reloaded = Context::get(&db, "user1", &context.id).await.expect("reload");
        assert_eq!(reloaded.chunk_count, 0);
        assert!(!reloaded.has_nodes);
    }

    #[tokio::test]
    async fn failed_task_is_requeued_with_backoff_before_exhausting_attempts() {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
                .await
                .expect("memory db"),
        );
        db.ensure_initialized(8).await.expect("init schema");

        let task = IngestionTask::enqueue(&db, "user1".to_string(), "missing-context".to_string())
            .await
            .expect("enqueue");

        let pipeline = IngestionPipeline::new(db.clone(), test_enricher(), test_config());
        assert!(pipeline.process_task(&task).await.is_err());

        let reloaded: IngestionTask = db
            .get_item(&task.id)
            .await
            .expect("get")
            .expect("task exists");
        match reloaded.status {
            IngestionTaskStatus::InProgress { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("expected a requeue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_task_is_marked_failed_once_attempts_exhausted() {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
                .await
                .expect("memory db"),
        );
        db.ensure_initialized(8).await.expect("init schema");

        let mut task = IngestionTask::new("user1".to_string(), "missing-context".to_string());
        task.status = IngestionTaskStatus::InProgress {
            attempts: MAX_ATTEMPTS,
            leased_until: chrono::Utc::now(),
        };
        db.store_item(task.clone()).await.expect("store task");

        let pipeline = IngestionPipeline::new(db.clone(), test_enricher(), test_config());
        assert!(pipeline.process_task(&task).await.is_err());

        let reloaded: IngestionTask = db
            .get_item(&task.id)
            .await
            .expect("get")
            .expect("task exists");
        assert!(matches!(reloaded.status, IngestionTaskStatus::Failed(_)));
    }
}
