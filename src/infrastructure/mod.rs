pub mod cache;
pub mod config;
pub mod embedding;
pub mod queue;
pub mod store;
pub mod telemetry;
pub mod vector_store;

pub use cache::{CacheStats, TierCache, TieredEmbeddingCache};
pub use config::{AppConfig, PromptsConfig, QueueBackend};
pub use embedding::GeminiEmbedding;
pub use queue::{ChannelQueue, RedisQueue};
pub use store::InMemoryMarketplace;
pub use telemetry::{init_tracing, LogFormat};
pub use vector_store::{InMemoryVectorStore, QdrantVectorStore};
