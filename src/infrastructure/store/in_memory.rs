use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{
    ports::{ActivityStore, ListingStore},
    DomainError, Listing, ListingId, ParentCompany, UserId,
};

#[derive(Default)]
struct Marketplace {
    listings: BTreeMap<ListingId, Listing>,
    parent_companies: HashMap<String, ParentCompany>,
    bookmarks: HashMap<UserId, Vec<ListingId>>,
    /// Oldest first.
    clicks: HashMap<UserId, Vec<ListingId>>,
    /// Oldest first.
    searches: HashMap<UserId, Vec<String>>,
}

/// Relational-store stand-in holding listings and user activity in memory.
#[derive(Default)]
pub struct InMemoryMarketplace {
    inner: RwLock<Marketplace>,
}

impl InMemoryMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Marketplace>, DomainError> {
        self.inner
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Marketplace>, DomainError> {
        self.inner
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))
    }

    pub fn insert_listing(&self, listing: Listing) -> Result<(), DomainError> {
        self.write()?.listings.insert(listing.id, listing);
        Ok(())
    }

    pub fn remove_listing(&self, id: ListingId) -> Result<Option<Listing>, DomainError> {
        Ok(self.write()?.listings.remove(&id))
    }

    pub fn add_parent_company(
        &self,
        make: impl Into<String>,
        company: ParentCompany,
    ) -> Result<(), DomainError> {
        self.write()?
            .parent_companies
            .insert(make.into().to_lowercase(), company);
        Ok(())
    }

    /// Bookmarking the same listing twice keeps one bookmark.
    pub fn bookmark(&self, user_id: UserId, listing_id: ListingId) -> Result<(), DomainError> {
        let mut market = self.write()?;
        let bookmarks = market.bookmarks.entry(user_id).or_default();
        if !bookmarks.contains(&listing_id) {
            bookmarks.push(listing_id);
        }
        Ok(())
    }

    pub fn record_click(&self, user_id: UserId, listing_id: ListingId) -> Result<(), DomainError> {
        self.write()?
            .clicks
            .entry(user_id)
            .or_default()
            .push(listing_id);
        Ok(())
    }

    pub fn record_search(
        &self,
        user_id: UserId,
        query: impl Into<String>,
    ) -> Result<(), DomainError> {
        self.write()?
            .searches
            .entry(user_id)
            .or_default()
            .push(query.into());
        Ok(())
    }

    pub fn has_embedding(&self, id: ListingId) -> Result<bool, DomainError> {
        Ok(self
            .read()?
            .listings
            .get(&id)
            .is_some_and(|listing| listing.has_embedding))
    }
}

#[async_trait]
impl ListingStore for InMemoryMarketplace {
    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, DomainError> {
        Ok(self.read()?.listings.get(&id).cloned())
    }

    async fn listings_without_embeddings(&self) -> Result<Vec<Listing>, DomainError> {
        Ok(self
            .read()?
            .listings
            .values()
            .filter(|listing| !listing.has_embedding)
            .cloned()
            .collect())
    }

    async fn mark_listings_embedded(&self, ids: &[ListingId]) -> Result<(), DomainError> {
        let mut market = self.write()?;
        for id in ids {
            if let Some(listing) = market.listings.get_mut(id) {
                listing.has_embedding = true;
            }
        }
        Ok(())
    }

    async fn parent_company_for_make(
        &self,
        make: &str,
    ) -> Result<Option<ParentCompany>, DomainError> {
        Ok(self
            .read()?
            .parent_companies
            .get(&make.trim().to_lowercase())
            .cloned())
    }
}

#[async_trait]
impl ActivityStore for InMemoryMarketplace {
    async fn bookmarked_listing_ids(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ListingId>, DomainError> {
        Ok(self
            .read()?
            .bookmarks
            .get(&user_id)
            .map(|ids| ids.iter().rev().take(limit).copied().collect())
            .unwrap_or_default())
    }

    async fn recent_click_ids(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ListingId>, DomainError> {
        Ok(self
            .read()?
            .clicks
            .get(&user_id)
            .map(|ids| ids.iter().rev().take(limit).copied().collect())
            .unwrap_or_default())
    }

    async fn recent_searches(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<String>, DomainError> {
        Ok(self
            .read()?
            .searches
            .get(&user_id)
            .map(|queries| queries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    /// Ranked by total clicks across all users, ties broken by lower id.
    async fn most_engaged_listing_ids(&self, limit: usize) -> Result<Vec<ListingId>, DomainError> {
        let market = self.read()?;
        let mut counts: HashMap<ListingId, usize> = HashMap::new();
        for id in market.clicks.values().flatten() {
            *counts.entry(*id).or_default() += 1;
        }

        let mut ranked: Vec<(ListingId, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(ranked.into_iter().take(limit).map(|(id, _)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clicks_are_most_recent_first() {
        let market = InMemoryMarketplace::new();
        for id in [1, 2, 3] {
            market.record_click(9, id).unwrap();
        }

        assert_eq!(market.recent_click_ids(9, 2).await.unwrap(), vec![3, 2]);
        assert!(market.recent_click_ids(10, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_embedded_updates_backfill_set() {
        let market = InMemoryMarketplace::new();
        market.insert_listing(Listing::new(1, "Radiator")).unwrap();
        market.insert_listing(Listing::new(2, "Hood")).unwrap();

        market.mark_listings_embedded(&[1, 404]).await.unwrap();

        let pending: Vec<ListingId> = market
            .listings_without_embeddings()
            .await
            .unwrap()
            .iter()
            .map(|listing| listing.id)
            .collect();
        assert_eq!(pending, vec![2]);
        assert!(market.has_embedding(1).unwrap());
    }

    #[tokio::test]
    async fn test_most_engaged_ranking() {
        let market = InMemoryMarketplace::new();
        market.record_click(1, 10).unwrap();
        market.record_click(2, 10).unwrap();
        market.record_click(1, 20).unwrap();
        market.record_click(3, 30).unwrap();

        assert_eq!(market.most_engaged_listing_ids(2).await.unwrap(), vec![10, 20]);
    }

    #[tokio::test]
    async fn test_parent_company_lookup_ignores_case() {
        let market = InMemoryMarketplace::new();
        market
            .add_parent_company(
                "Lexus",
                ParentCompany {
                    name: "Toyota Motor Corporation".into(),
                    country: "Japan".into(),
                },
            )
            .unwrap();

        let company = market.parent_company_for_make("LEXUS").await.unwrap();
        assert_eq!(company.map(|c| c.country), Some("Japan".to_string()));
        assert!(market.parent_company_for_make("Ford").await.unwrap().is_none());
    }
}
