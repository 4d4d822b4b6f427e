mod in_memory;
mod qdrant;

pub use in_memory::InMemoryVectorStore;
pub use qdrant::{
    from_qdrant_payload, to_qdrant_filter, to_qdrant_payload, QdrantVectorStore, PAYLOAD_INDEXES,
};
