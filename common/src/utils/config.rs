use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,

    /// Embedding vector width. No default: the store refuses to start without an explicit
    /// value, since changing it later requires an index rebuild.
    pub embedding_dim: usize,
    /// Opaque tag stamped on every embedding written, so a later model swap can be detected
    /// and flagged for re-enrichment instead of silently mixing vector spaces.
    pub embedding_model_version: String,

    #[serde(default = "default_generator_model")]
    pub generator_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_max_chunk_tokens")]
    pub max_chunk_tokens: u32,
    #[serde(default)]
    pub target_chunk_tokens: Option<u32>,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_edges_per_node_k")]
    pub edges_per_node_k: usize,
    #[serde(default = "default_lsh_hyperplanes")]
    pub lsh_hyperplanes: u32,
    #[serde(default = "default_lsh_neighbor_buckets")]
    pub lsh_neighbor_buckets: usize,

    #[serde(default = "default_p_enrich")]
    pub p_enrich: usize,
    #[serde(default = "default_max_enrich_queue")]
    pub max_enrich_queue: usize,

    #[serde(default = "default_chunking_timeout_ms")]
    pub chunking_timeout_ms: u64,
    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,
    #[serde(default = "default_analyze_timeout_ms")]
    pub analyze_timeout_ms: u64,
    #[serde(default = "default_generate_timeout_ms")]
    pub generate_timeout_ms: u64,
    #[serde(default = "default_graph_add_timeout_ms")]
    pub graph_add_timeout_ms: u64,

    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
    #[serde(default = "default_graph_alpha")]
    pub graph_alpha: f32,
    #[serde(default = "default_graph_beta")]
    pub graph_beta: f32,
    #[serde(default = "default_graph_max_depth")]
    pub graph_max_depth: u32,
    #[serde(default = "default_factual_grounding_threshold")]
    pub factual_grounding_threshold: f32,
}

impl AppConfig {
    /// The effective semantic-grouping target, defaulting to `0.75 * MAX_CHUNK_TOKENS` when
    /// `target_chunk_tokens` is not set explicitly.
    pub fn effective_target_chunk_tokens(&self) -> u32 {
        self.target_chunk_tokens
            .unwrap_or_else(|| (self.max_chunk_tokens as f32 * 0.75) as u32)
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_generator_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_max_chunk_tokens() -> u32 {
    4000
}

fn default_similarity_threshold() -> f32 {
    0.62
}

fn default_edges_per_node_k() -> usize {
    16
}

fn default_lsh_hyperplanes() -> u32 {
    12
}

fn default_lsh_neighbor_buckets() -> usize {
    8
}

fn default_p_enrich() -> usize {
    8
}

fn default_max_enrich_queue() -> usize {
    10_000
}

fn default_chunking_timeout_ms() -> u64 {
    2_000
}

fn default_embedding_timeout_ms() -> u64 {
    15_000
}

fn default_analyze_timeout_ms() -> u64 {
    15_000
}

fn default_generate_timeout_ms() -> u64 {
    30_000
}

fn default_graph_add_timeout_ms() -> u64 {
    5_000
}

fn default_rrf_k() -> u32 {
    60
}

fn default_graph_alpha() -> f32 {
    0.7
}

fn default_graph_beta() -> f32 {
    0.3
}

fn default_graph_max_depth() -> u32 {
    2
}

fn default_factual_grounding_threshold() -> f32 {
    0.35
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_chunk_tokens_defaults_to_three_quarters_of_max() {
        let config = AppConfig {
            openai_api_key: String::new(),
            surrealdb_address: String::new(),
            surrealdb_username: String::new(),
            surrealdb_password: String::new(),
            surrealdb_namespace: String::new(),
            surrealdb_database: String::new(),
            http_port: 8080,
            openai_base_url: default_base_url(),
            embedding_dim: 1536,
            embedding_model_version: "v1".to_string(),
            generator_model: default_generator_model(),
            embedding_model: default_embedding_model(),
            max_chunk_tokens: 4000,
            target_chunk_tokens: None,
            similarity_threshold: default_similarity_threshold(),
            edges_per_node_k: default_edges_per_node_k(),
            lsh_hyperplanes: default_lsh_hyperplanes(),
            lsh_neighbor_buckets: default_lsh_neighbor_buckets(),
            p_enrich: default_p_enrich(),
            max_enrich_queue: default_max_enrich_queue(),
            chunking_timeout_ms: default_chunking_timeout_ms(),
            embedding_timeout_ms: default_embedding_timeout_ms(),
            analyze_timeout_ms: default_analyze_timeout_ms(),
            generate_timeout_ms: default_generate_timeout_ms(),
            graph_add_timeout_ms: default_graph_add_timeout_ms(),
            rrf_k: default_rrf_k(),
            graph_alpha: default_graph_alpha(),
            graph_beta: default_graph_beta(),
            graph_max_depth: default_graph_max_depth(),
            factual_grounding_threshold: default_factual_grounding_threshold(),
        };
        assert_eq!(config.effective_target_chunk_tokens(), 3000);
    }
}
