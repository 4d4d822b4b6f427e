//! Fakes and fixtures shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{
    ports::{ensure_count, validate_texts, EmbeddingService, VectorStore},
    DomainError, Embedding, Listing, ListingId, Location, Payload, SearchPage, SearchQuery,
};
use crate::infrastructure::InMemoryVectorStore;

pub const DIMENSION: usize = 4;

/// Deterministic embedder that records every provider call.
#[derive(Default)]
pub struct FakeEmbedder {
    fixed: Mutex<HashMap<String, Embedding>>,
    calls: AtomicUsize,
    texts: Mutex<Vec<Vec<String>>>,
    failing: AtomicBool,
}

impl FakeEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pins the vector returned for `text`.
    pub fn with_vector(self: Arc<Self>, text: &str, vector: Vec<f32>) -> Arc<Self> {
        self.fixed
            .lock()
            .unwrap()
            .insert(text.to_string(), Embedding::new(vector));
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts of each provider call, in call order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.texts.lock().unwrap().clone()
    }

    fn vector_for(&self, text: &str) -> Embedding {
        if let Some(vector) = self.fixed.lock().unwrap().get(text) {
            return vector.clone();
        }
        let mut values = vec![0.0f32; DIMENSION];
        for (i, byte) in text.bytes().enumerate() {
            values[i % DIMENSION] += f32::from(byte) / 255.0;
        }
        Embedding::new(values)
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, DomainError> {
        let texts = validate_texts(texts)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(texts.clone());

        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::external("embedding provider unavailable"));
        }

        let embeddings: Vec<Embedding> = texts.iter().map(|t| self.vector_for(t)).collect();
        ensure_count(texts.len(), &embeddings)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreCalls {
    pub upsert: usize,
    pub delete: usize,
    pub get: usize,
    pub query: usize,
}

/// In-memory vector store that counts calls and can be switched to fail.
#[derive(Default)]
pub struct CountingVectorStore {
    inner: InMemoryVectorStore,
    calls: Mutex<StoreCalls>,
    failing: AtomicBool,
}

impl CountingVectorStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> StoreCalls {
        *self.calls.lock().unwrap()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn seed(&self, id: ListingId, vector: Vec<f32>) {
        self.inner
            .upsert(&[id], &[Embedding::new(vector)], &[Payload::new()])
            .await
            .unwrap();
    }

    fn record(&self, update: impl FnOnce(&mut StoreCalls)) -> Result<(), DomainError> {
        update(&mut self.calls.lock().unwrap());
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::external("vector store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for CountingVectorStore {
    async fn upsert(
        &self,
        ids: &[ListingId],
        vectors: &[Embedding],
        payloads: &[Payload],
    ) -> Result<(), DomainError> {
        crate::domain::ports::validate_batch(ids, vectors, payloads)?;
        self.record(|calls| calls.upsert += 1)?;
        self.inner.upsert(ids, vectors, payloads).await
    }

    async fn delete(&self, id: ListingId) -> Result<(), DomainError> {
        self.record(|calls| calls.delete += 1)?;
        self.inner.delete(id).await
    }

    async fn get(&self, ids: &[ListingId]) -> Result<Vec<Option<Embedding>>, DomainError> {
        self.record(|calls| calls.get += 1)?;
        self.inner.get(ids).await
    }

    async fn query(&self, query: &SearchQuery) -> Result<SearchPage, DomainError> {
        self.record(|calls| calls.query += 1)?;
        self.inner.query(query).await
    }
}

pub fn listing(id: ListingId, title: &str) -> Listing {
    Listing::new(id, title)
        .with_description(format!("{title} in good condition"))
        .with_vehicle("Honda", &["2004", "2005"], &["Civic"], &["1.7L"])
        .with_category("Engine", "Alternators")
        .with_price(120.0)
        .with_location(Location {
            city: "Portland".into(),
            admin_area: "OR".into(),
            country: "USA".into(),
            coordinates: None,
        })
}
