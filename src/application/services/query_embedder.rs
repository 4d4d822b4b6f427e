use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use crate::domain::{
    ports::{ensure_count, query_key, validate_texts, CacheTier, EmbeddingCache, EmbeddingService},
    DomainError, Embedding,
};

/// Cache-aside resolution of search text to query embeddings.
///
/// Two concurrent misses for the same text may both reach the provider; nothing coalesces them.
pub struct QueryEmbedder {
    embedding: Arc<dyn EmbeddingService>,
    cache: Arc<dyn EmbeddingCache>,
}

impl QueryEmbedder {
    pub fn new(embedding: Arc<dyn EmbeddingService>, cache: Arc<dyn EmbeddingCache>) -> Self {
        Self { embedding, cache }
    }

    #[instrument(skip(self))]
    pub async fn get_or_embed(&self, text: &str) -> Result<Embedding, DomainError> {
        let key = query_key(text);
        if key.is_empty() {
            return Err(DomainError::validation("query text is empty"));
        }

        if let Some(vector) = self.cache.get(CacheTier::Query, &key) {
            return Ok(vector);
        }

        let vector = self.embedding.embed(&key).await?;
        self.cache.set(CacheTier::Query, &key, vector.clone());
        Ok(vector)
    }

    /// Resolves every text, in input order, with at most one provider call for all misses.
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn get_or_embed_many(&self, texts: &[String]) -> Result<Vec<Embedding>, DomainError> {
        let keys = validate_texts(texts)?;

        let mut resolved: HashMap<&str, Embedding> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        for key in &keys {
            if resolved.contains_key(key.as_str()) || missing.contains(key) {
                continue;
            }
            match self.cache.get(CacheTier::Query, key) {
                Some(vector) => {
                    resolved.insert(key, vector);
                }
                None => missing.push(key.clone()),
            }
        }

        if !missing.is_empty() {
            let vectors = self.embedding.embed_batch(&missing).await?;
            ensure_count(missing.len(), &vectors)?;

            for (text, vector) in missing.iter().zip(vectors) {
                self.cache.set(CacheTier::Query, text, vector.clone());
                resolved.insert(text, vector);
            }
            tracing::debug!(misses = missing.len(), "query embeddings fetched");
        }

        keys.iter()
            .map(|key| {
                resolved
                    .get(key.as_str())
                    .cloned()
                    .ok_or_else(|| DomainError::internal(format!("no embedding for '{key}'")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::TieredEmbeddingCache;
    use crate::test_support::FakeEmbedder;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn embedder() -> (Arc<FakeEmbedder>, Arc<TieredEmbeddingCache>, QueryEmbedder) {
        let fake = FakeEmbedder::new();
        let cache = Arc::new(TieredEmbeddingCache::default());
        let service = QueryEmbedder::new(fake.clone(), cache.clone());
        (fake, cache, service)
    }

    #[tokio::test]
    async fn test_get_or_embed_uses_cache_after_first_call() {
        let (fake, cache, service) = embedder();

        let first = service.get_or_embed("  brake pads ").await.unwrap();
        let second = service.get_or_embed("brake pads").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fake.calls(), 1);
        assert!(cache.get(CacheTier::Query, "brake pads").is_some());
        assert!(cache.get(CacheTier::User, "brake pads").is_none());
    }

    #[tokio::test]
    async fn test_many_issues_one_call_then_none() {
        let (fake, _, service) = embedder();
        let input = texts(&["alternator", "starter", "radiator"]);

        let first = service.get_or_embed_many(&input).await.unwrap();
        assert_eq!(fake.calls(), 1);
        assert_eq!(fake.batches()[0].len(), 3);

        let second = service.get_or_embed_many(&input).await.unwrap();
        assert_eq!(fake.calls(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_many_preserves_order_with_partial_hits() {
        let fake = FakeEmbedder::new()
            .with_vector("a", vec![1.0, 0.0, 0.0, 0.0])
            .with_vector("b", vec![0.0, 1.0, 0.0, 0.0])
            .with_vector("c", vec![0.0, 0.0, 1.0, 0.0]);
        let service = QueryEmbedder::new(fake.clone(), Arc::new(TieredEmbeddingCache::default()));
        service.get_or_embed("b").await.unwrap();

        let result = service
            .get_or_embed_many(&texts(&["c", "b", "a", "c"]))
            .await
            .unwrap();

        assert_eq!(fake.calls(), 2);
        // only the uncached, de-duplicated texts are sent
        assert_eq!(fake.batches()[1], texts(&["c", "a"]));
        let firsts: Vec<f32> = result.iter().map(|v| v.as_slice()[2]).collect();
        assert_eq!(firsts, vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(result[1].as_slice()[1], 1.0);
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected() {
        let (fake, _, service) = embedder();

        assert!(matches!(
            service.get_or_embed_many(&[]).await,
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            service.get_or_embed_many(&texts(&["ok", " "])).await,
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            service.get_or_embed("   ").await,
            Err(DomainError::Validation(_))
        ));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_cached() {
        let (fake, cache, service) = embedder();
        fake.set_failing(true);

        assert!(service.get_or_embed("gasket").await.is_err());
        assert!(cache.get(CacheTier::Query, "gasket").is_none());

        fake.set_failing(false);
        assert!(service.get_or_embed("gasket").await.is_ok());
    }
}
