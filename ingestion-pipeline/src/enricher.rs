use std::sync::Arc;
use std::time::Duration;

use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
};
use common::{error::AppError, utils::embedding::fallback_embedding};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, warn};

const MAX_ATTEMPTS: usize = 3;

/// Result of `EmbedOne`/`EmbedBatch`: the vector plus whether it came from the provider or
/// from the deterministic fallback (in which case the caller must stamp
/// `needs_reenrichment = true` on the node).
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub vector: Vec<f32>,
    pub is_fallback: bool,
}

/// `AnalyzeNode` output.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeAnalysis {
    pub summary: String,
    pub keywords: Vec<String>,
    pub title: String,
    #[serde(default)]
    pub importance: Option<f32>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// `AnalyzePrompt` output.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptAnalysis {
    pub intent: String,
    pub is_factual: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// `GenerateAnswer` output.
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub text: String,
    pub model_version: String,
}

/// Calls the configured OpenAI-compatible embedding and chat models with bounded
/// concurrency, retries, and per-call timeouts. Every operation degrades to a
/// deterministic content-derived fallback rather than propagating a provider outage to
/// the caller — callers distinguish the two via `EmbeddingResult::is_fallback` or by
/// catching the `AppError` from the analysis/generation calls.
pub struct AiEnricher {
    client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    embedding_model: String,
    generator_model: String,
    embedding_dim: usize,
    embedding_timeout: Duration,
    analyze_timeout: Duration,
    generate_timeout: Duration,
    concurrency: Arc<Semaphore>,
}

impl AiEnricher {
    pub fn new(
        client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        embedding_model: String,
        generator_model: String,
        embedding_dim: usize,
        embedding_timeout_ms: u64,
        analyze_timeout_ms: u64,
        generate_timeout_ms: u64,
        p_enrich: usize,
    ) -> Self {
        Self {
            client,
            embedding_model,
            generator_model,
            embedding_dim,
            embedding_timeout: Duration::from_millis(embedding_timeout_ms),
            analyze_timeout: Duration::from_millis(analyze_timeout_ms),
            generate_timeout: Duration::from_millis(generate_timeout_ms),
            concurrency: Arc::new(Semaphore::new(p_enrich.max(1))),
        }
    }

    /// `EmbedOne(text) -> vector | FallbackVector`.
    pub async fn embed_one(&self, text: &str) -> EmbeddingResult {
        let _permit = self.concurrency.acquire().await.expect("semaphore is never closed");
        match self.call_embedding(text).await {
            Ok(vector) => EmbeddingResult {
                vector,
                is_fallback: false,
            },
            Err(err) => {
                warn!(error = %err, "embedding exhausted retries, using fallback vector");
                EmbeddingResult {
                    vector: fallback_embedding(text, self.embedding_dim),
                    is_fallback: true,
                }
            }
        }
    }

    /// `EmbedBatch(texts) -> vectors`, preserving order; partial failures return fallbacks
    /// for only the entries that failed rather than discarding the whole batch.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<EmbeddingResult> {
        let mut handles = Vec::with_capacity(texts.len());
        for text in texts {
            let text = text.clone();
            let enricher = self.clone_handles();
            handles.push(tokio::spawn(async move { enricher.embed_one(&text).await }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_err) => {
                    warn!(error = %join_err, "embedding task panicked, using empty fallback");
                    results.push(EmbeddingResult {
                        vector: fallback_embedding("", self.embedding_dim),
                        is_fallback: true,
                    });
                }
            }
        }
        results
    }

    /// `AnalyzeNode(content, type) -> {summary, keywords, title, importance?, categories?}`.
    pub async fn analyze_node(&self, content: &str, chunk_type: &str) -> Result<NodeAnalysis, AppError> {
        let _permit = self.concurrency.acquire().await.expect("semaphore is never closed");
        let schema = json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string" },
                "keywords": { "type": "array", "items": { "type": "string" } },
                "title": { "type": "string" },
                "importance": { "type": ["number", "null"] },
                "categories": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["summary", "keywords", "title", "importance", "categories"],
            "additionalProperties": false
        });

        let user_message = format!("chunk_type: {chunk_type}\ncontent:\n{content}");
        let content = self
            .chat_with_schema(
                "You analyze a single context chunk and return a structured summary, \
                 keyword list, short title, and optional importance/categories.",
                &user_message,
                "node_analysis",
                schema,
                self.analyze_timeout,
            )
            .await?;

        serde_json::from_str(&content)
            .map_err(|e| AppError::Internal(format!("failed to parse node analysis: {e}")))
    }

    /// `AnalyzePrompt(prompt) -> PromptAnalysis`.
    pub async fn analyze_prompt(&self, prompt: &str) -> Result<PromptAnalysis, AppError> {
        let _permit = self.concurrency.acquire().await.expect("semaphore is never closed");
        let schema = json!({
            "type": "object",
            "properties": {
                "intent": { "type": "string" },
                "is_factual": { "type": "boolean" },
                "keywords": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["intent", "is_factual"],
            "additionalProperties": false
        });

        let content = self
            .chat_with_schema(
                "You classify a user query's retrieval intent and whether it calls for a \
                 factual, verifiable answer.",
                prompt,
                "prompt_analysis",
                schema,
                self.analyze_timeout,
            )
            .await?;

        serde_json::from_str(&content)
            .map_err(|e| AppError::Internal(format!("failed to parse prompt analysis: {e}")))
    }

    /// `GenerateAnswer(query, assembledContext, limits) -> {text, modelVersion}`.
    pub async fn generate_answer(
        &self,
        query: &str,
        assembled_context: &str,
    ) -> Result<GeneratedAnswer, AppError> {
        let _permit = self.concurrency.acquire().await.expect("semaphore is never closed");
        let user_message = format!(
            "Question:\n{query}\n\nContext:\n{assembled_context}\n\n\
             Answer using only the provided context. Cite node titles where relevant."
        );

        let client = self.client.clone();
        let model = self.generator_model.clone();
        let timeout = self.generate_timeout;

        let text = retry_with_backoff(move || {
            let client = client.clone();
            let model = model.clone();
            let user_message = user_message.clone();
            async move {
                let request = CreateChatCompletionRequestArgs::default()
                    .model(&model)
                    .messages([
                        ChatCompletionRequestSystemMessage::from(
                            "You are a grounded answering assistant.",
                        )
                        .into(),
                        ChatCompletionRequestUserMessage::from(user_message).into(),
                    ])
                    .build()
                    .map_err(AppError::from)?;

                let response = tokio::time::timeout(timeout, client.chat().create(request))
                    .await
                    .map_err(|_| AppError::DeadlineExceeded("generate_answer timed out".into()))??;

                response
                    .choices
                    .first()
                    .and_then(|c| c.message.content.clone())
                    .ok_or_else(|| AppError::Internal("no content in generation response".into()))
            }
        })
        .await?;

        Ok(GeneratedAnswer {
            text,
            model_version: self.generator_model.clone(),
        })
    }

    async fn call_embedding(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let client = self.client.clone();
        let model = self.embedding_model.clone();
        let dimensions = self.embedding_dim;
        let timeout = self.embedding_timeout;
        let text = text.to_string();

        retry_with_backoff(move || {
            let client = client.clone();
            let model = model.clone();
            let text = text.clone();
            async move {
                tokio::time::timeout(
                    timeout,
                    common::utils::embedding::generate_embedding(&client, &text, &model, dimensions),
                )
                .await
                .map_err(|_| AppError::DeadlineExceeded("embedding call timed out".into()))?
            }
        })
        .await
    }

    async fn chat_with_schema(
        &self,
        system_message: &str,
        user_message: &str,
        schema_name: &str,
        schema: serde_json::Value,
        timeout: Duration,
    ) -> Result<String, AppError> {
        let client = self.client.clone();
        let model = self.generator_model.clone();
        let system_message = system_message.to_string();
        let user_message = user_message.to_string();
        let schema_name = schema_name.to_string();

        retry_with_backoff(move || {
            let client = client.clone();
            let model = model.clone();
            let system_message = system_message.clone();
            let user_message = user_message.clone();
            let schema_name = schema_name.clone();
            let schema = schema.clone();
            async move {
                let response_format = ResponseFormat::JsonSchema {
                    json_schema: ResponseFormatJsonSchema {
                        description: Some(format!("Structured {schema_name} output")),
                        name: schema_name,
                        schema: Some(schema),
                        strict: Some(true),
                    },
                };

                let request = CreateChatCompletionRequestArgs::default()
                    .model(&model)
                    .messages([
                        ChatCompletionRequestSystemMessage::from(system_message).into(),
                        ChatCompletionRequestUserMessage::from(user_message).into(),
                    ])
                    .response_format(response_format)
                    .build()
                    .map_err(AppError::from)?;

                let response = tokio::time::timeout(timeout, client.chat().create(request))
                    .await
                    .map_err(|_| AppError::DeadlineExceeded("analysis call timed out".into()))??;

                response
                    .choices
                    .first()
                    .and_then(|c| c.message.content.clone())
                    .ok_or_else(|| AppError::Internal("no content in analysis response".into()))
            }
        })
        .await
    }

    fn clone_handles(&self) -> Self {
        Self {
            client: self.client.clone(),
            embedding_model: self.embedding_model.clone(),
            generator_model: self.generator_model.clone(),
            embedding_dim: self.embedding_dim,
            embedding_timeout: self.embedding_timeout,
            analyze_timeout: self.analyze_timeout,
            generate_timeout: self.generate_timeout,
            concurrency: self.concurrency.clone(),
        }
    }
}

/// Exponential backoff with jitter, capped at [`MAX_ATTEMPTS`] total attempts, matching the
/// enrichment concurrency policy's retry contract.
async fn retry_with_backoff<F, Fut, T>(make_attempt: F) -> Result<T, AppError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, AppError>>,
{
    let strategy = ExponentialBackoff::from_millis(100)
        .map(jitter)
        .take(MAX_ATTEMPTS - 1);

    let mut attempt = 0usize;
    Retry::spawn(strategy, || {
        attempt += 1;
        let attempt_no = attempt;
        let fut = make_attempt();
        async move {
            let result = fut.await;
            if let Err(ref err) = result {
                debug!(attempt = attempt_no, error = %err, "enrichment call attempt failed");
            }
            result
        }
    })
    .await
}
