use common::utils::config::AppConfig;

/// Above this many nodes in a scope, a full cosine scan in [`crate::semantic`] would in a
/// full deployment shortcut through the LSH bucket map `graph_builder::lsh` already builds
/// for edge construction, rather than scanning every candidate. Below the threshold a full
/// scan and the bucket shortcut return the same ranking, so it is recorded here as a sizing
/// constant rather than duplicated into a second index structure.
pub const LARGE_SCOPE_NODE_THRESHOLD: usize = 10_000;

/// Retrieval-relevant slice of [`AppConfig`], collected once per engine instance so every
/// search mode and the RAG pipeline read from the same snapshot instead of re-touching the
/// environment per request.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub embedding_model_version: String,
    pub embedding_timeout_ms: u64,
    pub analyze_timeout_ms: u64,
    pub generate_timeout_ms: u64,
    pub rrf_k: u32,
    pub graph_alpha: f32,
    pub graph_beta: f32,
    pub graph_max_depth: u32,
    pub similarity_threshold: f32,
    pub factual_grounding_threshold: f32,
}

impl From<&AppConfig> for RetrievalConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            embedding_model: config.embedding_model.clone(),
            embedding_dim: config.embedding_dim,
            embedding_model_version: config.embedding_model_version.clone(),
            embedding_timeout_ms: config.embedding_timeout_ms,
            analyze_timeout_ms: config.analyze_timeout_ms,
            generate_timeout_ms: config.generate_timeout_ms,
            rrf_k: config.rrf_k,
            graph_alpha: config.graph_alpha,
            graph_beta: config.graph_beta,
            graph_max_depth: config.graph_max_depth,
            similarity_threshold: config.similarity_threshold,
            factual_grounding_threshold: config.factual_grounding_threshold,
        }
    }
}
