use common::utils::config::AppConfig;
use graph_builder::GraphBuildParams;

/// Retry backoff tuning for a failed ingestion task, kept separate from the store's own
/// lease mechanics since a retry here means "requeue with delay", not "extend the lease".
#[derive(Debug, Clone, Copy)]
pub struct RetryTuning {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub backoff_cap_exponent: u32,
}

impl Default for RetryTuning {
    fn default() -> Self {
        Self {
            base_delay_secs: 30,
            max_delay_secs: 15 * 60,
            backoff_cap_exponent: 5,
        }
    }
}

impl RetryTuning {
    /// Exponential backoff for a task's next retry, given its attempt count so far.
    pub fn delay_secs(&self, attempts: u32) -> i64 {
        let exponent = attempts.min(self.backoff_cap_exponent);
        let delay = self.base_delay_secs.saturating_mul(1u64 << exponent);
        delay.min(self.max_delay_secs) as i64
    }
}

/// Pipeline-relevant slice of [`AppConfig`], collected once per worker so every stage
/// reads from the same snapshot instead of re-touching the environment.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub max_chunk_tokens: u32,
    pub target_chunk_tokens: u32,
    pub embedding_model: String,
    pub generator_model: String,
    pub embedding_dim: usize,
    pub embedding_model_version: String,
    pub p_enrich: usize,
    pub max_enrich_queue: usize,
    pub embedding_timeout_ms: u64,
    pub analyze_timeout_ms: u64,
    pub generate_timeout_ms: u64,
    pub similarity_threshold: f32,
    pub edges_per_node_k: usize,
    pub lsh_hyperplanes: u32,
    pub lsh_neighbor_buckets: usize,
    pub retry: RetryTuning,
}

impl From<&AppConfig> for IngestionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_chunk_tokens: config.max_chunk_tokens,
            target_chunk_tokens: config.effective_target_chunk_tokens(),
            embedding_model: config.embedding_model.clone(),
            generator_model: config.generator_model.clone(),
            embedding_dim: config.embedding_dim,
            embedding_model_version: config.embedding_model_version.clone(),
            p_enrich: config.p_enrich,
            max_enrich_queue: config.max_enrich_queue,
            embedding_timeout_ms: config.embedding_timeout_ms,
            analyze_timeout_ms: config.analyze_timeout_ms,
            generate_timeout_ms: config.generate_timeout_ms,
            similarity_threshold: config.similarity_threshold,
            edges_per_node_k: config.edges_per_node_k,
            lsh_hyperplanes: config.lsh_hyperplanes,
            lsh_neighbor_buckets: config.lsh_neighbor_buckets,
            retry: RetryTuning::default(),
        }
    }
}

impl IngestionConfig {
    pub fn graph_build_params(&self) -> GraphBuildParams {
        GraphBuildParams {
            embedding_dim: self.embedding_dim,
            k_hyperplanes: self.lsh_hyperplanes,
            r_neighbor_buckets: self.lsh_neighbor_buckets,
            top_k_edges: self.edges_per_node_k,
            similarity_threshold: self.similarity_threshold,
        }
    }
}
