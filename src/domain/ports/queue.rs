use std::time::Duration;

use crate::domain::errors::DomainError;
use async_trait::async_trait;

/// Outcome of a bounded wait on a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pop<T> {
    Job(T),
    /// Nothing arrived within the wait.
    Idle,
    /// The queue is closed and drained.
    Drained,
}

/// A bounded FIFO of background jobs with one consumer.
#[async_trait]
pub trait JobQueue<T: Send + 'static>: Send + Sync {
    /// Waits while the queue is at capacity. Fails with `QueueClosed` after `close`.
    async fn push(&self, job: T) -> Result<(), DomainError>;

    /// Waits for the next job. `None` once the queue is closed and drained.
    ///
    /// Not cancel-safe on every backend: dropping the future mid-wait may lose a job.
    /// Consumers that stop on a signal use `pop_within` instead.
    async fn pop(&self) -> Result<Option<T>, DomainError>;

    /// Waits at most `wait` for the next job. Runs to completion, so a job taken off the
    /// queue is always returned to the caller.
    async fn pop_within(&self, wait: Duration) -> Result<Pop<T>, DomainError>;

    /// Takes a job only if one is immediately available.
    async fn try_pop(&self) -> Result<Option<T>, DomainError>;

    async fn len(&self) -> Result<usize, DomainError>;

    async fn is_empty(&self) -> Result<bool, DomainError> {
        Ok(self.len().await? == 0)
    }

    /// Stops accepting new jobs. Jobs already queued can still be popped.
    fn close(&self);
}
