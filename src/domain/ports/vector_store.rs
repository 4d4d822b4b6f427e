use crate::domain::{errors::DomainError, Embedding, ListingId, Payload, SearchPage, SearchQuery};
use async_trait::async_trait;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or replaces one point per id in a single store call.
    async fn upsert(
        &self,
        ids: &[ListingId],
        vectors: &[Embedding],
        payloads: &[Payload],
    ) -> Result<(), DomainError>;

    /// Removes a point. Deleting an id with no point succeeds.
    async fn delete(&self, id: ListingId) -> Result<(), DomainError>;

    /// One slot per requested id, in request order, `None` where no point exists.
    async fn get(&self, ids: &[ListingId]) -> Result<Vec<Option<Embedding>>, DomainError>;

    async fn query(&self, query: &SearchQuery) -> Result<SearchPage, DomainError>;
}

/// Checks that an upsert batch is well formed before any store call is made.
pub fn validate_batch(
    ids: &[ListingId],
    vectors: &[Embedding],
    payloads: &[Payload],
) -> Result<(), DomainError> {
    if ids.len() != vectors.len() || ids.len() != payloads.len() {
        return Err(DomainError::LengthMismatch {
            ids: ids.len(),
            vectors: vectors.len(),
            payloads: payloads.len(),
        });
    }
    Ok(())
}
