use std::sync::Arc;
use tracing::instrument;

use crate::domain::{
    aggregate,
    ports::{site_key, ActivityStore, CacheTier, EmbeddingCache, VectorStore},
    DomainError, Embedding,
};

use super::QueryEmbedder;

/// Ranking vector for visitors without a personal signal: the centroid of the most engaged
/// listings, pulled toward a fixed preference sentence.
pub struct SiteVectorService {
    vector_store: Arc<dyn VectorStore>,
    activity: Arc<dyn ActivityStore>,
    queries: Arc<QueryEmbedder>,
    cache: Arc<dyn EmbeddingCache>,
    preference: String,
    default_campaign: String,
    top_listings: usize,
    base_weight: f32,
    preference_weight: f32,
}

impl SiteVectorService {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        activity: Arc<dyn ActivityStore>,
        queries: Arc<QueryEmbedder>,
        cache: Arc<dyn EmbeddingCache>,
        preference: impl Into<String>,
    ) -> Self {
        Self {
            vector_store,
            activity,
            queries,
            cache,
            preference: preference.into(),
            default_campaign: "default".to_string(),
            top_listings: 50,
            base_weight: 1.0,
            preference_weight: 1.5,
        }
    }

    pub fn with_default_campaign(mut self, campaign: impl Into<String>) -> Self {
        self.default_campaign = campaign.into();
        self
    }

    pub fn with_top_listings(mut self, top_listings: usize) -> Self {
        self.top_listings = top_listings;
        self
    }

    pub fn with_blend(mut self, base_weight: f32, preference_weight: f32) -> Self {
        self.base_weight = base_weight;
        self.preference_weight = preference_weight;
        self
    }

    pub async fn default_site_vector(&self) -> Result<Embedding, DomainError> {
        self.site_vector(&self.default_campaign).await
    }

    #[instrument(skip(self))]
    pub async fn site_vector(&self, campaign: &str) -> Result<Embedding, DomainError> {
        let key = site_key(campaign);
        if let Some(vector) = self.cache.get(CacheTier::Site, &key) {
            return Ok(vector);
        }

        let vector = self
            .compute()
            .await
            .map_err(|e| e.context(format!("site vector '{campaign}'")))?;

        self.cache.set(CacheTier::Site, &key, vector.clone());
        tracing::info!(campaign, "site vector computed");
        Ok(vector)
    }

    async fn compute(&self) -> Result<Embedding, DomainError> {
        let ids = self
            .activity
            .most_engaged_listing_ids(self.top_listings)
            .await?;
        let stored: Vec<Embedding> = if ids.is_empty() {
            Vec::new()
        } else {
            self.vector_store.get(&ids).await?.into_iter().flatten().collect()
        };

        let weights = vec![1.0f32; stored.len()];
        let base = aggregate(&stored, &weights)
            .ok_or_else(|| DomainError::not_found("no embedded listings with engagement"))?;

        let preference = match self.queries.get_or_embed(&self.preference).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(error = %e, "preference embedding failed, using centroid");
                return Ok(base);
            }
        };

        let blended = aggregate(
            &[base.as_slice(), preference.as_slice()],
            &[self.base_weight, self.preference_weight],
        );
        Ok(blended.unwrap_or(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{InMemoryMarketplace, TieredEmbeddingCache};
    use crate::test_support::{CountingVectorStore, FakeEmbedder};

    const PREFERENCE: &str = "Prefer trustworthy listings with few reported issues.";

    struct Fixture {
        embedder: Arc<FakeEmbedder>,
        store: Arc<CountingVectorStore>,
        market: Arc<InMemoryMarketplace>,
        service: SiteVectorService,
    }

    fn fixture() -> Fixture {
        let embedder = FakeEmbedder::new().with_vector(PREFERENCE, vec![0.0, 0.0, 0.0, 1.0]);
        let store = CountingVectorStore::new();
        let market = Arc::new(InMemoryMarketplace::new());
        let cache = Arc::new(TieredEmbeddingCache::default());
        let queries = Arc::new(QueryEmbedder::new(embedder.clone(), cache.clone()));
        let service =
            SiteVectorService::new(store.clone(), market.clone(), queries, cache, PREFERENCE);
        Fixture {
            embedder,
            store,
            market,
            service,
        }
    }

    #[tokio::test]
    async fn test_blends_engagement_centroid_with_preference() {
        let f = fixture();
        f.store.seed(1, vec![1.0, 0.0, 0.0, 0.0]).await;
        f.store.seed(2, vec![0.0, 1.0, 0.0, 0.0]).await;
        f.market.record_click(1, 1).unwrap();
        f.market.record_click(2, 2).unwrap();

        let vector = f.service.default_site_vector().await.unwrap();

        // centroid (0.5, 0.5, 0, 0) at 1.0, preference at 1.5
        let expected = [0.2, 0.2, 0.0, 0.6];
        for (actual, expected) in vector.as_slice().iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_cached_per_campaign() {
        let f = fixture();
        f.store.seed(1, vec![1.0, 0.0, 0.0, 0.0]).await;
        f.market.record_click(1, 1).unwrap();

        f.service.site_vector("spring").await.unwrap();
        f.service.site_vector("spring").await.unwrap();
        assert_eq!(f.store.calls().get, 1);
        assert_eq!(f.embedder.calls(), 1);

        f.service.site_vector("summer").await.unwrap();
        assert_eq!(f.store.calls().get, 2);
    }

    #[tokio::test]
    async fn test_preference_failure_falls_back_to_centroid() {
        let f = fixture();
        f.store.seed(1, vec![1.0, 0.0, 0.0, 0.0]).await;
        f.market.record_click(1, 1).unwrap();
        f.embedder.set_failing(true);

        let vector = f.service.default_site_vector().await.unwrap();

        assert_eq!(vector.as_slice(), &[1.0, 0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_no_engagement_is_not_found() {
        let f = fixture();

        let err = f.service.default_site_vector().await.unwrap_err();

        assert!(matches!(err.root(), DomainError::NotFound(_)));
        assert_eq!(f.store.calls().get, 0);
    }
}
