mod listing_indexer;
mod personalization;
mod query_embedder;
mod queues;
mod search;
mod site_vector;

pub use listing_indexer::{listing_payload, listing_prompt, quality_sentence, ListingIndexer};
pub use personalization::{PersonalizationService, SignalWeights};
pub use query_embedder::QueryEmbedder;
pub use queues::{EmbeddingQueues, QueueStats};
pub use search::{RankingSource, SearchRequest, SearchResults, SearchService};
pub use site_vector::SiteVectorService;
