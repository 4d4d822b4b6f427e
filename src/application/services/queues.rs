use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::instrument;

use crate::domain::{
    ports::{JobQueue, ListingStore},
    DomainError, Listing, ListingJob, UserId, UserJob,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub listing_pending: usize,
    pub user_pending: usize,
    pub listings_queued: u64,
    pub users_queued: u64,
    pub users_deduplicated: u64,
    pub dead_lettered: u64,
}

#[derive(Default)]
struct Counters {
    listings_queued: AtomicU64,
    users_queued: AtomicU64,
    users_deduplicated: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Producer side of the two background queues, shared by request paths and workers.
pub struct EmbeddingQueues {
    listings: Arc<dyn JobQueue<ListingJob>>,
    users: Arc<dyn JobQueue<UserJob>>,
    pending_users: Mutex<HashSet<UserId>>,
    counters: Counters,
}

impl EmbeddingQueues {
    pub fn new(
        listings: Arc<dyn JobQueue<ListingJob>>,
        users: Arc<dyn JobQueue<UserJob>>,
    ) -> Self {
        Self {
            listings,
            users,
            pending_users: Mutex::new(HashSet::new()),
            counters: Counters::default(),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<UserId>> {
        self.pending_users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn listing_queue(&self) -> Arc<dyn JobQueue<ListingJob>> {
        Arc::clone(&self.listings)
    }

    pub fn user_queue(&self) -> Arc<dyn JobQueue<UserJob>> {
        Arc::clone(&self.users)
    }

    /// Waits only while the listing queue is full.
    #[instrument(skip(self, listing), fields(listing_id = listing.id))]
    pub async fn queue_listing(&self, listing: &Listing) -> Result<(), DomainError> {
        self.listings.push(ListingJob::new(listing.to_ref())).await?;
        self.counters.listings_queued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns `false` when the user already has a recompute pending.
    #[instrument(skip(self))]
    pub async fn queue_user_for_update(&self, user_id: UserId) -> Result<bool, DomainError> {
        if !self.pending().insert(user_id) {
            self.counters
                .users_deduplicated
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(user_id, "user already queued");
            return Ok(false);
        }

        if let Err(e) = self.users.push(UserJob::new(user_id)).await {
            self.pending().remove(&user_id);
            return Err(e);
        }
        self.counters.users_queued.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Puts a failed job back, bypassing de-duplication so its attempt count survives.
    pub async fn requeue_user(&self, job: UserJob) -> Result<(), DomainError> {
        let user_id = job.user_id;
        self.pending().insert(user_id);
        if let Err(e) = self.users.push(job).await {
            self.pending().remove(&user_id);
            return Err(e);
        }
        Ok(())
    }

    /// Keeps the user marked pending while a retry waits out its backoff.
    pub fn hold_for_retry(&self, user_id: UserId) {
        self.pending().insert(user_id);
    }

    /// Called by the user worker when it takes a job off the queue.
    pub fn take_user(&self, user_id: UserId) {
        self.pending().remove(&user_id);
    }

    pub fn record_dead_letter(&self, job: &UserJob, error: &DomainError) {
        self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            user_id = job.user_id,
            job_id = %job.job_id,
            attempts = job.attempt + 1,
            error = %error,
            "user job dead-lettered"
        );
    }

    /// Enqueues every listing the store reports without an embedding. Returns how many were queued.
    #[instrument(skip(self, store))]
    pub async fn queue_listings_without_embeddings(
        &self,
        store: &dyn ListingStore,
    ) -> Result<usize, DomainError> {
        let listings = store.listings_without_embeddings().await?;
        for listing in &listings {
            self.queue_listing(listing).await?;
        }
        tracing::info!(count = listings.len(), "listings queued for backfill");
        Ok(listings.len())
    }

    pub async fn stats(&self) -> Result<QueueStats, DomainError> {
        Ok(QueueStats {
            listing_pending: self.listings.len().await?,
            user_pending: self.users.len().await?,
            listings_queued: self.counters.listings_queued.load(Ordering::Relaxed),
            users_queued: self.counters.users_queued.load(Ordering::Relaxed),
            users_deduplicated: self.counters.users_deduplicated.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
        })
    }

    /// Stops both queues from accepting jobs. Workers drain what is left, then exit.
    pub fn close(&self) {
        self.listings.close();
        self.users.close();
    }
}
