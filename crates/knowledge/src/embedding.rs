//! Embedding generation.
//!
//! The [`Embedder`] trait is the seam between the knowledge pipeline and the
//! hosted model. [`OpenAiEmbedder`] is the production implementation.

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use rizz_common::{Result, RizzError};
use tiktoken_rs::CoreBPE;
use tracing::{debug, instrument};

use crate::document_processor::{normalize_text, truncate_to_tokens, MAX_EMBEDDING_TOKENS};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Turns free text into a fixed-length vector.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier stored next to every vector it produces.
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
    bpe: CoreBPE,
}

impl OpenAiEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        // Falls back to OPENAI_API_KEY when no key is configured
        let mut openai_config = OpenAIConfig::new();
        if let Some(key) = config.api_key {
            openai_config = openai_config.with_api_key(key);
        }
        if let Some(base) = config.api_base {
            openai_config = openai_config.with_api_base(base);
        }

        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| RizzError::Configuration(format!("Failed to load tokenizer: {}", e)))?;

        Ok(Self {
            client: Client::with_config(openai_config),
            model: config.model,
            dimension: config.dimension,
            bpe,
        })
    }

    fn prepare(&self, text: &str) -> Result<String> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Err(RizzError::Validation(
                "Cannot embed empty text".to_string(),
            ));
        }
        truncate_to_tokens(&self.bpe, &normalized, MAX_EMBEDDING_TOKENS)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    #[instrument(skip(self, text), fields(model = %self.model, chars = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = self.prepare(text)?;

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(input)
            .build()
            .map_err(|e| RizzError::Embedding(format!("Invalid embedding request: {}", e)))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| RizzError::Embedding(format!("Embedding request failed: {}", e)))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| RizzError::Embedding("No embedding returned".to_string()))?
            .embedding;

        check_dimension(&embedding, self.dimension)?;
        debug!("Generated {}-dimensional embedding", embedding.len());
        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Rejects vectors whose length does not match the configured dimension.
pub fn check_dimension(embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.len() != expected {
        return Err(RizzError::Embedding(format!(
            "Expected {} dimensions, model returned {}",
            expected,
            embedding.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_embedder() -> OpenAiEmbedder {
        OpenAiEmbedder::new(EmbeddingConfig {
            api_key: Some("sk-test".to_string()),
            ..EmbeddingConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.model, "text-embedding-3-small");
        assert_eq!(config.dimension, 1536);
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_request() {
        let embedder = test_embedder();
        let result = embedder.embed(" \n\t ").await;
        assert!(matches!(result, Err(RizzError::Validation(_))));
    }

    #[test]
    fn test_prepare_normalizes_whitespace() {
        let embedder = test_embedder();
        assert_eq!(embedder.prepare("  likes\n\nchess ").unwrap(), "likes chess");
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(&[0.0; 4], 4).is_ok());
        assert!(matches!(
            check_dimension(&[0.0; 3], 4),
            Err(RizzError::Embedding(_))
        ));
    }
}
