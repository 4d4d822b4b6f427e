use std::sync::OnceLock;

use async_trait::async_trait;
use rig::client::{EmbeddingsClient, ProviderClient};
use rig::embeddings::EmbeddingModel;
use rig::providers::gemini;

use crate::domain::{
    ports::{ensure_count, validate_texts, EmbeddingService},
    DomainError, Embedding,
};
use crate::infrastructure::config::EmbeddingConfig;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Batched text embeddings from the Gemini API.
pub struct GeminiEmbedding {
    model: String,
    dimension: usize,
    client: OnceLock<gemini::Client>,
}

impl GeminiEmbedding {
    pub fn new() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            model: config.model.clone(),
            dimension: config.dimension,
            client: OnceLock::new(),
        }
    }

    /// Builds the provider client. Fails when the API key is not set.
    pub fn init(&self) -> Result<(), DomainError> {
        if self.client.get().is_some() {
            return Ok(());
        }

        let key_present = std::env::var(API_KEY_ENV).is_ok_and(|key| !key.trim().is_empty());
        if !key_present {
            return Err(DomainError::validation(format!("{API_KEY_ENV} is not set")));
        }

        let _ = self.client.set(gemini::Client::from_env());
        tracing::info!(
            model = %self.model,
            dimension = self.dimension,
            "gemini embedding client initialized"
        );
        Ok(())
    }

    fn client(&self) -> Result<&gemini::Client, DomainError> {
        self.client
            .get()
            .ok_or_else(|| DomainError::not_initialized("gemini embedding client"))
    }
}

impl Default for GeminiEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingService for GeminiEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, DomainError> {
        let texts = validate_texts(texts)?;
        let client = self.client()?;
        let model = client.embedding_model_with_ndims(&self.model, self.dimension);

        let requested = texts.len();
        let embeddings = model
            .embed_texts(texts)
            .await
            .map_err(|e| DomainError::external(format!("gemini embed ({requested} texts): {e}")))?;

        let embeddings: Vec<Embedding> = embeddings
            .into_iter()
            .map(|emb| Embedding::new(emb.vec.into_iter().map(|x| x as f32).collect()))
            .collect();
        ensure_count(requested, &embeddings)?;

        if let Some(bad) = embeddings.iter().find(|e| e.dimension() != self.dimension) {
            return Err(DomainError::external(format!(
                "gemini returned dimension {}, expected {}",
                bad.dimension(),
                self.dimension
            )));
        }

        tracing::debug!(count = requested, "texts embedded");
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
