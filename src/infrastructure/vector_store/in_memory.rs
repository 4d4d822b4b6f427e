use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::domain::{
    ports::{validate_batch, VectorStore},
    DomainError, Embedding, ListingId, Payload, SearchHit, SearchPage, SearchQuery,
};

/// Brute-force cosine store with the same query contract as the Qdrant adapter.
pub struct InMemoryVectorStore {
    points: RwLock<BTreeMap<ListingId, (Embedding, Payload)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|points| points.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(
        &self,
        ids: &[ListingId],
        vectors: &[Embedding],
        payloads: &[Payload],
    ) -> Result<(), DomainError> {
        validate_batch(ids, vectors, payloads)?;

        let mut store = self
            .points
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        for ((id, vector), payload) in ids.iter().zip(vectors).zip(payloads) {
            store.insert(*id, (vector.clone(), payload.clone()));
        }
        Ok(())
    }

    async fn delete(&self, id: ListingId) -> Result<(), DomainError> {
        let mut store = self
            .points
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        store.remove(&id);
        Ok(())
    }

    async fn get(&self, ids: &[ListingId]) -> Result<Vec<Option<Embedding>>, DomainError> {
        let store = self
            .points
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        Ok(ids
            .iter()
            .map(|id| store.get(id).map(|(vector, _)| vector.clone()))
            .collect())
    }

    async fn query(&self, query: &SearchQuery) -> Result<SearchPage, DomainError> {
        let store = self
            .points
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        let mut results: Vec<SearchHit> = store
            .iter()
            .filter(|(_, (_, payload))| {
                query
                    .filter
                    .as_ref()
                    .map_or(true, |filter| filter.matches(payload))
            })
            .map(|(id, (vector, payload))| SearchHit {
                listing_id: *id,
                score: query.vector.cosine_similarity(vector),
                payload: payload.clone(),
            })
            .filter(|hit| hit.score >= query.score_threshold)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.listing_id.cmp(&b.listing_id))
        });

        let offset = query.offset();
        let hits: Vec<SearchHit> = results
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(query.limit)
            .collect();

        Ok(SearchPage::from_hits(hits, offset, query.limit))
    }
}
