//! Background consumers for the listing and user embedding queues.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::{EmbeddingQueues, ListingIndexer, PersonalizationService};
use crate::domain::{
    ports::{JobQueue, ListingStore, Pop},
    DomainError, Listing, ListingJob, UserJob,
};
use crate::infrastructure::config::WorkerConfig;

/// Blocks for one job, then takes up to `max` in total without waiting again.
///
/// Returns an empty batch when `max` is zero or the queue is closed and drained.
pub async fn collect_available<T: Send + 'static>(
    queue: &dyn JobQueue<T>,
    max: usize,
) -> Result<Vec<T>, DomainError> {
    if max == 0 {
        return Ok(Vec::new());
    }
    match queue.pop().await? {
        Some(first) => Ok(drain_available(queue, first, max).await),
        None => Ok(Vec::new()),
    }
}

/// Extends a batch that already holds `first` with jobs that are immediately available.
///
/// A failed read ends the drain early; jobs already taken stay in the batch.
pub async fn drain_available<T: Send + 'static>(
    queue: &dyn JobQueue<T>,
    first: T,
    max: usize,
) -> Vec<T> {
    let mut batch = vec![first];
    while batch.len() < max {
        match queue.try_pop().await {
            Ok(Some(job)) => batch.push(job),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(drained = batch.len(), error = %e, "queue drain cut short");
                break;
            }
        }
    }
    batch
}

/// Waits for `duration` unless shutdown is signalled first. Returns `false` on shutdown.
///
/// A dropped sender is not a shutdown signal.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        Ok(()) = shutdown.changed() => false,
    }
}

pub struct ListingWorker {
    queue: Arc<dyn JobQueue<ListingJob>>,
    listings: Arc<dyn ListingStore>,
    indexer: Arc<ListingIndexer>,
    chunk_size: usize,
    sleep: Duration,
    poll_wait: Duration,
}

impl ListingWorker {
    pub fn new(
        queue: Arc<dyn JobQueue<ListingJob>>,
        listings: Arc<dyn ListingStore>,
        indexer: Arc<ListingIndexer>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            queue,
            listings,
            indexer,
            chunk_size: config.listing_chunk_size.max(1),
            sleep: config.listing_sleep(),
            poll_wait: config.poll_wait(),
        }
    }

    /// Resolves a drained chunk to full listings and embeds them together.
    /// Returns how many listings were embedded.
    pub async fn process_chunk(&self, jobs: Vec<ListingJob>) -> Result<usize, DomainError> {
        let mut listings: Vec<Listing> = Vec::with_capacity(jobs.len());
        for job in jobs {
            let id = job.listing.id;
            match self.listings.get_listing(id).await {
                Ok(Some(listing)) => listings.push(listing),
                Ok(None) => tracing::warn!(listing_id = id, "queued listing no longer exists"),
                Err(e) => {
                    tracing::warn!(listing_id = id, error = %e, "failed to load queued listing")
                }
            }
        }

        if listings.is_empty() {
            return Ok(0);
        }
        self.indexer.embed_and_upsert(&listings).await?;
        Ok(listings.len())
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(chunk_size = self.chunk_size, "listing worker started");

        // shutdown is only checked between bounded waits, never while a pop is in flight
        while !*shutdown.borrow() {
            match self.queue.pop_within(self.poll_wait).await {
                Ok(Pop::Job(first)) => {
                    let jobs = drain_available(self.queue.as_ref(), first, self.chunk_size).await;
                    let drained = jobs.len();
                    if let Err(e) = self.process_chunk(jobs).await {
                        // listings stay unflagged and are picked up by the next backfill
                        tracing::error!(drained, error = %e, "listing chunk failed");
                    }
                }
                Ok(Pop::Idle) => continue,
                Ok(Pop::Drained) => break,
                Err(e) => tracing::error!(error = %e, "listing queue read failed"),
            }

            if !pause(self.sleep, &mut shutdown).await {
                break;
            }
        }

        tracing::info!("listing worker stopped");
    }
}

pub struct UserWorker {
    queues: Arc<EmbeddingQueues>,
    personalization: Arc<PersonalizationService>,
    config: WorkerConfig,
}

impl UserWorker {
    pub fn new(
        queues: Arc<EmbeddingQueues>,
        personalization: Arc<PersonalizationService>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queues,
            personalization,
            config,
        }
    }

    /// Recomputes one user's vector. Retryable failures are re-enqueued after a backoff by a
    /// detached task, so the worker moves on to the next user immediately.
    pub async fn process(&self, job: UserJob) {
        let user_id = job.user_id;
        self.queues.take_user(user_id);

        let error = match self.personalization.get_user_vector(user_id, true).await {
            Ok(_) => return,
            Err(e) => e,
        };

        if !error.is_retryable() {
            tracing::warn!(user_id, error = %error, "user job dropped");
            return;
        }

        let failures = job.attempt + 1;
        if failures >= self.config.user_max_attempts {
            self.queues.record_dead_letter(&job, &error);
            return;
        }

        let delay = self.config.user_backoff(failures);
        tracing::warn!(
            user_id,
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "user job will be retried"
        );

        // updates arriving during the backoff fold into this retry
        self.queues.hold_for_retry(user_id);
        let queues = Arc::clone(&self.queues);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queues.requeue_user(job.next_attempt()).await {
                tracing::warn!(user_id, error = %e, "user job could not be requeued");
            }
        });
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("user worker started");
        let queue = self.queues.user_queue();
        let poll_wait = self.config.poll_wait();

        while !*shutdown.borrow() {
            match queue.pop_within(poll_wait).await {
                Ok(Pop::Job(job)) => self.process(job).await,
                Ok(Pop::Idle) => {}
                Ok(Pop::Drained) => break,
                Err(e) => {
                    tracing::error!(error = %e, "user queue read failed");
                    if !pause(Duration::from_secs(1), &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        tracing::info!("user worker stopped");
    }
}

/// Running worker tasks and the signal that stops them.
///
/// Dropping the handle detaches the workers: they keep consuming until the queues close.
#[must_use = "workers can only be stopped gracefully through this handle"]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signals both loops and waits for them. A chunk already being embedded finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}

pub fn spawn_workers(listing: ListingWorker, user: UserWorker) -> WorkerHandle {
    let (shutdown, receiver) = watch::channel(false);
    let tasks = vec![
        tokio::spawn(listing.run(receiver.clone())),
        tokio::spawn(user.run(receiver)),
    ];
    WorkerHandle { shutdown, tasks }
}
