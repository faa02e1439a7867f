use std::sync::atomic::AtomicUsize;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::context::Context, types::context_node::ContextNode},
};
use tracing::error;

use crate::chunker;
use crate::enricher::AiEnricher;

use super::config::IngestionConfig;

/// Threads the task being processed, its loaded context, and the intermediate artifacts
/// each stage produces through the pipeline without every stage function needing its own
/// parameter list.
pub struct PipelineContext<'a> {
    pub task_id: String,
    pub db: &'a SurrealDbClient,
    pub config: &'a IngestionConfig,
    pub enricher: &'a AiEnricher,
    pub queue_depth: &'a AtomicUsize,
    pub context: Context,
    pub chunks: Vec<chunker::Chunk>,
    pub nodes: Vec<ContextNode>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        task_id: String,
        db: &'a SurrealDbClient,
        config: &'a IngestionConfig,
        enricher: &'a AiEnricher,
        queue_depth: &'a AtomicUsize,
        context: Context,
    ) -> Self {
        Self {
            task_id,
            db,
            config,
            enricher,
            queue_depth,
            context,
            chunks: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn abort(&self, err: AppError) -> AppError {
        error!(
            task_id = %self.task_id,
            context_id = %self.context.id,
            error = %err,
            "ingestion pipeline aborted"
        );
        err
    }
}
