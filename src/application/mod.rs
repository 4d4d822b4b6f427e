//! Application layer - Use cases and orchestration.
//!
//! Services here resolve query, user and site vectors, keep the listing index in sync and
//! feed the background queues. They depend on domain ports (traits) rather than concrete
//! adapters.

pub mod services;

pub use services::{
    EmbeddingQueues, ListingIndexer, PersonalizationService, QueryEmbedder, QueueStats,
    RankingSource, SearchRequest, SearchResults, SearchService, SignalWeights, SiteVectorService,
};
