use std::sync::Arc;
use tracing::instrument;

use crate::domain::{
    aggregate,
    ports::{user_key, ActivityStore, CacheTier, EmbeddingCache, VectorStore},
    DomainError, Embedding, ListingId, UserId,
};

use super::QueryEmbedder;

/// Relative weight of each activity signal in a user's interest vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalWeights {
    pub bookmark: f32,
    pub click: f32,
    pub search: f32,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            bookmark: 3.0,
            click: 2.0,
            search: 1.0,
        }
    }
}

pub struct PersonalizationService {
    vector_store: Arc<dyn VectorStore>,
    activity: Arc<dyn ActivityStore>,
    queries: Arc<QueryEmbedder>,
    cache: Arc<dyn EmbeddingCache>,
    signal_limit: usize,
    weights: SignalWeights,
}

impl PersonalizationService {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        activity: Arc<dyn ActivityStore>,
        queries: Arc<QueryEmbedder>,
        cache: Arc<dyn EmbeddingCache>,
    ) -> Self {
        Self {
            vector_store,
            activity,
            queries,
            cache,
            signal_limit: 10,
            weights: SignalWeights::default(),
        }
    }

    pub fn with_signal_limit(mut self, signal_limit: usize) -> Self {
        self.signal_limit = signal_limit;
        self
    }

    pub fn with_weights(mut self, weights: SignalWeights) -> Self {
        self.weights = weights;
        self
    }

    /// The user's interest vector, served from the user cache unless `force` is set.
    ///
    /// Fails with `NoActivity` when none of the user's bookmarks, clicks or searches resolve
    /// to a vector.
    #[instrument(skip(self))]
    pub async fn get_user_vector(
        &self,
        user_id: UserId,
        force: bool,
    ) -> Result<Embedding, DomainError> {
        let key = user_key(user_id);
        if !force {
            if let Some(vector) = self.cache.get(CacheTier::User, &key) {
                return Ok(vector);
            }
        }

        let vector = self
            .compute(user_id)
            .await
            .map_err(|e| e.context(format!("user {user_id}")))?;

        self.cache.set(CacheTier::User, &key, vector.clone());
        tracing::info!(user_id, dimension = vector.dimension(), "user vector computed");
        Ok(vector)
    }

    async fn compute(&self, user_id: UserId) -> Result<Embedding, DomainError> {
        let limit = self.signal_limit;
        let bookmarks = self.activity.bookmarked_listing_ids(user_id, limit).await?;
        let clicks = self.activity.recent_click_ids(user_id, limit).await?;
        let searches: Vec<String> = self
            .activity
            .recent_searches(user_id, limit)
            .await?
            .into_iter()
            .filter(|text| !text.trim().is_empty())
            .collect();

        let mut vectors: Vec<Embedding> = Vec::new();
        let mut weights: Vec<f32> = Vec::new();

        let ids: Vec<ListingId> = bookmarks.iter().chain(&clicks).copied().collect();
        if !ids.is_empty() {
            let stored = self.vector_store.get(&ids).await?;
            for (index, (id, slot)) in ids.iter().zip(stored).enumerate() {
                let Some(vector) = slot else {
                    tracing::debug!(user_id, listing_id = id, "no stored embedding for signal");
                    continue;
                };
                let weight = if index < bookmarks.len() {
                    self.weights.bookmark
                } else {
                    self.weights.click
                };
                vectors.push(vector);
                weights.push(weight);
            }
        }

        if !searches.is_empty() {
            match self.queries.get_or_embed_many(&searches).await {
                Ok(embedded) => {
                    weights.extend(std::iter::repeat(self.weights.search).take(embedded.len()));
                    vectors.extend(embedded);
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "search signals ignored");
                }
            }
        }

        aggregate(&vectors, &weights).ok_or(DomainError::NoActivity { user_id })
    }
}
