use crate::domain::{errors::DomainError, Listing, ListingId, ParentCompany};
use async_trait::async_trait;

/// Read access to listing records plus the one write-back the pipeline needs.
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, DomainError>;

    async fn listings_without_embeddings(&self) -> Result<Vec<Listing>, DomainError>;

    async fn mark_listings_embedded(&self, ids: &[ListingId]) -> Result<(), DomainError>;

    async fn parent_company_for_make(
        &self,
        make: &str,
    ) -> Result<Option<ParentCompany>, DomainError>;
}
