use crate::domain::{errors::DomainError, Embedding};
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embeds every text in one provider request, returning vectors in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, DomainError>;

    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| DomainError::internal("No embedding returned"))
    }

    fn dimension(&self) -> usize;
}

/// Trims every text and rejects the batch if it is empty or any entry is blank.
pub fn validate_texts(texts: &[String]) -> Result<Vec<String>, DomainError> {
    if texts.is_empty() {
        return Err(DomainError::validation("no texts to embed"));
    }

    texts
        .iter()
        .enumerate()
        .map(|(index, text)| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Err(DomainError::validation(format!(
                    "text at index {index} is empty"
                )))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

/// A provider must answer with exactly one vector per requested text.
pub fn ensure_count(requested: usize, embeddings: &[Embedding]) -> Result<(), DomainError> {
    if embeddings.len() != requested {
        return Err(DomainError::CountMismatch {
            requested,
            returned: embeddings.len(),
        });
    }
    Ok(())
}
