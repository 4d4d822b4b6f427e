use crate::domain::{errors::DomainError, ListingId, UserId};
use async_trait::async_trait;

/// User activity signals and engagement rankings.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn bookmarked_listing_ids(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ListingId>, DomainError>;

    /// Most recent first.
    async fn recent_click_ids(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ListingId>, DomainError>;

    async fn recent_searches(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<String>, DomainError>;

    async fn most_engaged_listing_ids(&self, limit: usize) -> Result<Vec<ListingId>, DomainError>;
}
