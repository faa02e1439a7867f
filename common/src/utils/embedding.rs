use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_openai::types::CreateEmbeddingRequestArgs;
use tracing::debug;

use crate::error::AppError;

/// Generates an embedding vector for `input` via the configured OpenAI-compatible model.
///
/// # Errors
///
/// Returns `AppError` if the request building fails, the API call fails, or no embedding
/// data is returned.
pub async fn generate_embedding(
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    input: &str,
    model: &str,
    dimensions: usize,
) -> Result<Vec<f32>, AppError> {
    let request = CreateEmbeddingRequestArgs::default()
        .model(model)
        .dimensions(dimensions as u32)
        .input([input])
        .build()?;

    let response = client.embeddings().create(request).await?;

    let embedding: Vec<f32> = response
        .data
        .first()
        .ok_or_else(|| AppError::Internal("no embedding data received".to_string()))?
        .embedding
        .clone();

    debug!(dimensions = embedding.len(), "embedding created");

    Ok(embedding)
}

/// Deterministic fallback vector used when the embedding provider is unavailable after
/// retries: a unit-normalized hashed-feature vector derived from word 3-grams of `input`.
/// Two calls on the same content and dimension always produce the same vector, so stored
/// fallback embeddings remain comparable to each other (though not to real model output).
pub fn fallback_embedding(input: &str, dimensions: usize) -> Vec<f32> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    let mut vector = vec![0f32; dimensions];

    if tokens.is_empty() {
        return vector;
    }

    for window in tokens.windows(3.min(tokens.len())) {
        let gram = window.join(" ");
        let mut hasher = DefaultHasher::new();
        gram.hash(&mut hasher);
        let hash = hasher.finish();
        let bucket = (hash as usize) % dimensions;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_embedding_is_deterministic() {
        let a = fallback_embedding("chunking system performance overview", 64);
        let b = fallback_embedding("chunking system performance overview", 64);
        assert_eq!(a, b);
    }

    #[test]
    fn fallback_embedding_is_unit_normalized() {
        let v = fallback_embedding("a reasonably long piece of sample content here", 32);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[test]
    fn fallback_embedding_handles_empty_input() {
        let v = fallback_embedding("", 16);
        assert_eq!(v, vec![0.0; 16]);
    }
}
