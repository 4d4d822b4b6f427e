mod activity_store;
mod cache;
mod embedding;
mod listing_store;
mod queue;
mod vector_store;

pub use activity_store::ActivityStore;
pub use cache::{query_key, site_key, user_key, CacheTier, EmbeddingCache};
pub use embedding::{ensure_count, validate_texts, EmbeddingService};
pub use listing_store::ListingStore;
pub use queue::{JobQueue, Pop};
pub use vector_store::{validate_batch, VectorStore};
