use std::sync::Arc;
use tracing::instrument;

use crate::domain::{
    ports::{ensure_count, EmbeddingService, ListingStore, VectorStore},
    DomainError, Listing, ListingId, ParentCompany, Payload, PayloadValue,
};

/// Human-readable quality line derived from how many rocks a listing has drawn.
pub fn quality_sentence(rock_count: u32) -> String {
    match rock_count {
        0 => "This listing has no reported issues (0 rocks thrown).".to_string(),
        1 => "This listing has 1 reported issue (1 rock thrown).".to_string(),
        n => format!("This listing has {n} reported issues ({n} rocks thrown)."),
    }
}

pub fn listing_prompt(
    instruction: &str,
    listing: &Listing,
    parent: Option<&ParentCompany>,
) -> String {
    let location = listing
        .location
        .as_ref()
        .map(|location| location.label())
        .unwrap_or_default();

    let lines = [
        ("Title", listing.title.clone()),
        ("Description", listing.description.clone()),
        ("Make", listing.make.clone()),
        ("Parent Company", parent.map(|p| p.name.clone()).unwrap_or_default()),
        (
            "Parent Company Country",
            parent.map(|p| p.country.clone()).unwrap_or_default(),
        ),
        ("Years", listing.years.join(", ")),
        ("Models", listing.models.join(", ")),
        ("Engines", listing.engines.join(", ")),
        ("Category", listing.category.clone()),
        ("Subcategory", listing.subcategory.clone()),
        ("Price", format!("{:.2}", listing.price)),
        ("Location", location),
        ("Quality Indicator", quality_sentence(listing.rock_count)),
    ];

    let body: Vec<String> = lines
        .into_iter()
        .map(|(label, value)| format!("{label}: {value}"))
        .collect();
    format!("{}\n\n{}", instruction.trim(), body.join("\n"))
}

pub fn listing_payload(listing: &Listing) -> Payload {
    let mut payload = Payload::new();
    payload.insert("ad_category_id".into(), listing.ad_category_id.into());
    payload.insert("make".into(), listing.make.clone().into());
    payload.insert("category".into(), listing.category.clone().into());
    payload.insert("subcategory".into(), listing.subcategory.clone().into());
    payload.insert("years".into(), listing.years.clone().into());
    payload.insert("models".into(), listing.models.clone().into());
    payload.insert("engines".into(), listing.engines.clone().into());
    payload.insert("price".into(), listing.price.into());
    payload.insert(
        "rock_count".into(),
        PayloadValue::Integer(i64::from(listing.rock_count)),
    );
    if let Some(point) = listing.location.as_ref().and_then(|l| l.coordinates) {
        payload.insert("location".into(), point.into());
    }
    payload
}

/// Embeds listings and keeps the vector index in sync with them.
pub struct ListingIndexer {
    embedding: Arc<dyn EmbeddingService>,
    vector_store: Arc<dyn VectorStore>,
    listings: Arc<dyn ListingStore>,
    instruction: String,
}

impl ListingIndexer {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        vector_store: Arc<dyn VectorStore>,
        listings: Arc<dyn ListingStore>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            embedding,
            vector_store,
            listings,
            instruction: instruction.into(),
        }
    }

    /// Prompt text and payload for one listing.
    /// A failed parent-company lookup leaves those lines blank.
    pub async fn build_listing_document(&self, listing: &Listing) -> (String, Payload) {
        let parent = if listing.make.trim().is_empty() {
            None
        } else {
            match self.listings.parent_company_for_make(&listing.make).await {
                Ok(parent) => parent,
                Err(e) => {
                    tracing::warn!(
                        listing_id = listing.id,
                        make = %listing.make,
                        error = %e,
                        "parent company lookup failed"
                    );
                    None
                }
            }
        };

        (
            listing_prompt(&self.instruction, listing, parent.as_ref()),
            listing_payload(listing),
        )
    }

    /// One provider call and one upsert for the whole batch, then the has-embedding write-back.
    #[instrument(skip(self, listings), fields(count = listings.len()))]
    pub async fn embed_and_upsert(&self, listings: &[Listing]) -> Result<(), DomainError> {
        if listings.is_empty() {
            return Ok(());
        }

        let ids: Vec<ListingId> = listings.iter().map(|l| l.id).collect();
        self.index_batch(&ids, listings)
            .await
            .map_err(|e| e.context(format!("listing batch {ids:?}")))?;

        tracing::info!(count = ids.len(), "listings embedded");
        Ok(())
    }

    async fn index_batch(
        &self,
        ids: &[ListingId],
        listings: &[Listing],
    ) -> Result<(), DomainError> {
        let mut prompts = Vec::with_capacity(listings.len());
        let mut payloads = Vec::with_capacity(listings.len());
        for listing in listings {
            let (prompt, payload) = self.build_listing_document(listing).await;
            prompts.push(prompt);
            payloads.push(payload);
        }

        let vectors = self.embedding.embed_batch(&prompts).await?;
        ensure_count(prompts.len(), &vectors)?;

        self.vector_store.upsert(ids, &vectors, &payloads).await?;
        self.listings.mark_listings_embedded(ids).await
    }

    #[instrument(skip(self, listing), fields(listing_id = listing.id))]
    pub async fn embed_listing(&self, listing: &Listing) -> Result<(), DomainError> {
        self.embed_and_upsert(std::slice::from_ref(listing)).await
    }

    /// Drops the listing's vector. Removing a listing that was never indexed succeeds.
    #[instrument(skip(self))]
    pub async fn remove_listing(&self, id: ListingId) -> Result<(), DomainError> {
        self.vector_store
            .delete(id)
            .await
            .map_err(|e| e.context(format!("listing {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GeoPoint, Location};
    use crate::infrastructure::InMemoryMarketplace;
    use crate::test_support::{listing, CountingVectorStore, FakeEmbedder};

    struct Fixture {
        embedder: Arc<FakeEmbedder>,
        store: Arc<CountingVectorStore>,
        market: Arc<InMemoryMarketplace>,
        indexer: ListingIndexer,
    }

    fn fixture() -> Fixture {
        let embedder = FakeEmbedder::new();
        let store = CountingVectorStore::new();
        let market = Arc::new(InMemoryMarketplace::new());
        let indexer = ListingIndexer::new(
            embedder.clone(),
            store.clone(),
            market.clone(),
            "Encode this listing.",
        );
        Fixture {
            embedder,
            store,
            market,
            indexer,
        }
    }

    #[test]
    fn test_quality_sentence() {
        assert_eq!(
            quality_sentence(0),
            "This listing has no reported issues (0 rocks thrown)."
        );
        assert_eq!(
            quality_sentence(1),
            "This listing has 1 reported issue (1 rock thrown)."
        );
        assert_eq!(
            quality_sentence(4),
            "This listing has 4 reported issues (4 rocks thrown)."
        );
    }

    #[test]
    fn test_prompt_is_deterministic_and_labelled() {
        let parent = ParentCompany {
            name: "Honda Motor Co.".into(),
            country: "Japan".into(),
        };
        let item = listing(3, "Alternator").with_rock_count(2);

        let prompt = listing_prompt("Encode this listing.", &item, Some(&parent));

        assert_eq!(prompt, listing_prompt("Encode this listing.", &item, Some(&parent)));
        assert!(prompt.starts_with("Encode this listing.\n\nTitle: Alternator\n"));
        assert!(prompt.contains("Parent Company: Honda Motor Co.\n"));
        assert!(prompt.contains("Parent Company Country: Japan\n"));
        assert!(prompt.contains("Years: 2004, 2005\n"));
        assert!(prompt.contains("Price: 120.00\n"));
        assert!(prompt.contains("Location: Portland, OR, USA\n"));
        assert!(prompt
            .ends_with("Quality Indicator: This listing has 2 reported issues (2 rocks thrown)."));
    }

    #[test]
    fn test_payload_has_typed_fields() {
        let mut item = listing(3, "Alternator").with_rock_count(1);
        item.ad_category_id = 7;

        let payload = listing_payload(&item);
        assert_eq!(payload["ad_category_id"], PayloadValue::Integer(7));
        assert_eq!(payload["rock_count"], PayloadValue::Integer(1));
        assert!(payload["years"].has_keyword("2005"));
        assert!(!payload.contains_key("location"));

        let located = item.with_location(Location {
            coordinates: Some(GeoPoint::new(45.5, -122.6)),
            ..Default::default()
        });
        assert_eq!(
            listing_payload(&located)["location"].as_geo(),
            Some(GeoPoint::new(45.5, -122.6))
        );
    }

    #[tokio::test]
    async fn test_batch_uses_one_embed_and_one_upsert() {
        let f = fixture();
        let batch: Vec<Listing> = (1..=3).map(|id| listing(id, "Starter")).collect();
        for item in &batch {
            f.market.insert_listing(item.clone()).unwrap();
        }

        f.indexer.embed_and_upsert(&batch).await.unwrap();

        assert_eq!(f.embedder.calls(), 1);
        assert_eq!(f.store.calls().upsert, 1);
        assert_eq!(f.store.get(&[1, 2, 3]).await.unwrap().iter().flatten().count(), 3);
        for id in 1..=3 {
            assert!(f.market.has_embedding(id).unwrap());
        }
    }

    #[tokio::test]
    async fn test_upsert_failure_aborts_batch_without_marking() {
        let f = fixture();
        let item = listing(9, "Hood");
        f.market.insert_listing(item.clone()).unwrap();
        f.store.set_failing(true);

        let err = f.indexer.embed_listing(&item).await.unwrap_err();

        assert!(err.to_string().starts_with("listing batch [9]"));
        assert!(matches!(err.root(), DomainError::ExternalService(_)));
        assert!(!f.market.has_embedding(9).unwrap());
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let f = fixture();
        f.indexer.embed_and_upsert(&[]).await.unwrap();
        assert_eq!(f.embedder.calls(), 0);
        assert_eq!(f.store.calls().upsert, 0);
    }

    #[tokio::test]
    async fn test_remove_listing_is_idempotent() {
        let f = fixture();
        f.store.seed(4, vec![1.0, 0.0, 0.0, 0.0]).await;

        f.indexer.remove_listing(4).await.unwrap();
        f.indexer.remove_listing(4).await.unwrap();

        assert!(f.store.get(&[4]).await.unwrap()[0].is_none());
    }
}
