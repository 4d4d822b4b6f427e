//! Construction of the whole pipeline from `AppConfig`.

use std::sync::Arc;

use crate::application::{
    EmbeddingQueues, ListingIndexer, PersonalizationService, QueryEmbedder, SearchService,
    SignalWeights, SiteVectorService,
};
use crate::domain::{
    ports::{ActivityStore, EmbeddingService, JobQueue, ListingStore, VectorStore},
    DomainError, ListingJob, UserJob,
};
use crate::infrastructure::{
    config::QueueConfig,
    queue::{create_pool, queues},
    AppConfig, ChannelQueue, GeminiEmbedding, QdrantVectorStore, QueueBackend, RedisQueue,
    TieredEmbeddingCache,
};
use crate::worker::{spawn_workers, ListingWorker, UserWorker, WorkerHandle};

/// Every service of the pipeline, wired to one set of adapters.
#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<AppConfig>,
    pub cache: Arc<TieredEmbeddingCache>,
    pub queries: Arc<QueryEmbedder>,
    pub indexer: Arc<ListingIndexer>,
    pub personalization: Arc<PersonalizationService>,
    pub site: Arc<SiteVectorService>,
    pub search: Arc<SearchService>,
    pub queues: Arc<EmbeddingQueues>,
    listings: Arc<dyn ListingStore>,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        embedding: Arc<dyn EmbeddingService>,
        vector_store: Arc<dyn VectorStore>,
        listings: Arc<dyn ListingStore>,
        activity: Arc<dyn ActivityStore>,
        queues: EmbeddingQueues,
    ) -> Result<Self, DomainError> {
        config.validate()?;
        let config = Arc::new(config);

        let cache = Arc::new(TieredEmbeddingCache::new(&config.cache));
        let queries = Arc::new(QueryEmbedder::new(embedding.clone(), cache.clone()));
        let indexer = Arc::new(ListingIndexer::new(
            embedding,
            vector_store.clone(),
            listings.clone(),
            config.prompts.listing_instruction.clone(),
        ));

        let personalization = Arc::new(
            PersonalizationService::new(
                vector_store.clone(),
                activity.clone(),
                queries.clone(),
                cache.clone(),
            )
            .with_signal_limit(config.personalization.signal_limit)
            .with_weights(SignalWeights {
                bookmark: config.personalization.bookmark_weight,
                click: config.personalization.click_weight,
                search: config.personalization.search_weight,
            }),
        );

        let site = Arc::new(
            SiteVectorService::new(
                vector_store.clone(),
                activity,
                queries.clone(),
                cache.clone(),
                config.prompts.site_preference.clone(),
            )
            .with_default_campaign(config.site.campaign.clone())
            .with_top_listings(config.site.top_listings)
            .with_blend(config.site.base_weight, config.site.preference_weight),
        );

        let queues = Arc::new(queues);
        let search = Arc::new(
            SearchService::new(
                vector_store,
                queries.clone(),
                personalization.clone(),
                site.clone(),
                queues.clone(),
            )
            .with_score_threshold(config.search.score_threshold)
            .with_paging(config.search.page_size, config.search.initial_k),
        );

        Ok(Self {
            config,
            cache,
            queries,
            indexer,
            personalization,
            site,
            search,
            queues,
            listings,
        })
    }

    /// Connects the Gemini and Qdrant clients and the configured queue backend.
    pub async fn connect(
        config: AppConfig,
        listings: Arc<dyn ListingStore>,
        activity: Arc<dyn ActivityStore>,
    ) -> Result<Self, DomainError> {
        let embedding = GeminiEmbedding::from_config(&config.embedding);
        embedding.init()?;

        let vector_store = QdrantVectorStore::new(config.qdrant.clone());
        vector_store.init().await?;

        let queues = build_queues(&config.queue)?;
        tracing::info!(
            collection = %config.qdrant.collection,
            queue_backend = ?config.queue.backend,
            "pipeline connected"
        );

        Self::new(
            config,
            Arc::new(embedding),
            Arc::new(vector_store),
            listings,
            activity,
            queues,
        )
    }

    /// Queues every listing that has no embedding yet.
    pub async fn backfill(&self) -> Result<usize, DomainError> {
        self.queues
            .queue_listings_without_embeddings(self.listings.as_ref())
            .await
    }

    pub fn spawn_workers(&self) -> WorkerHandle {
        let listing = ListingWorker::new(
            self.queues.listing_queue(),
            self.listings.clone(),
            self.indexer.clone(),
            &self.config.worker,
        );
        let user = UserWorker::new(
            self.queues.clone(),
            self.personalization.clone(),
            self.config.worker.clone(),
        );
        spawn_workers(listing, user)
    }
}

pub fn build_queues(config: &QueueConfig) -> Result<EmbeddingQueues, DomainError> {
    let (listings, users): (Arc<dyn JobQueue<ListingJob>>, Arc<dyn JobQueue<UserJob>>) =
        match config.backend {
            QueueBackend::Channel => (
                Arc::new(ChannelQueue::new(config.listing_capacity)),
                Arc::new(ChannelQueue::new(config.user_capacity)),
            ),
            QueueBackend::Redis => {
                let pool = create_pool(&config.redis_url)?;
                let poll = config.poll_interval();
                (
                    Arc::new(
                        RedisQueue::new(
                            pool.clone(),
                            queues::LISTING_QUEUE,
                            config.listing_capacity,
                        )
                        .with_poll_interval(poll),
                    ),
                    Arc::new(
                        RedisQueue::new(pool, queues::USER_QUEUE, config.user_capacity)
                            .with_poll_interval(poll),
                    ),
                )
            }
        };
    Ok(EmbeddingQueues::new(listings, users))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{RankingSource, SearchRequest};
    use crate::infrastructure::{InMemoryMarketplace, InMemoryVectorStore};
    use crate::test_support::{listing, FakeEmbedder, DIMENSION};
    use std::time::Duration;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.embedding.dimension = DIMENSION;
        config.qdrant.dimension = DIMENSION;
        config.worker.listing_sleep_ms = 10;
        config.worker.poll_wait_ms = 10;
        config.search.score_threshold = 0.0;
        config
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.qdrant.dimension = DIMENSION + 1;
        let market = Arc::new(InMemoryMarketplace::new());

        let result = Pipeline::new(
            config,
            FakeEmbedder::new(),
            Arc::new(InMemoryVectorStore::new()),
            market.clone(),
            market,
            build_queues(&QueueConfig::default()).unwrap(),
        );

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_backfill_index_then_search() {
        let market = Arc::new(InMemoryMarketplace::new());
        market.insert_listing(listing(1, "Alternator")).unwrap();
        market.insert_listing(listing(2, "Starter motor")).unwrap();

        let pipeline = Pipeline::new(
            config(),
            FakeEmbedder::new(),
            Arc::new(InMemoryVectorStore::new()),
            market.clone(),
            market.clone(),
            build_queues(&QueueConfig::default()).unwrap(),
        )
        .unwrap();

        assert_eq!(pipeline.backfill().await.unwrap(), 2);
        let handle = pipeline.spawn_workers();
        for _ in 0..100 {
            if market.has_embedding(1).unwrap() && market.has_embedding(2).unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;

        let results = pipeline.search.search(&SearchRequest::text("alternator")).await;
        assert_eq!(results.source, RankingSource::Query);
        assert_eq!(results.page.hits.len(), 2);
    }
}
