use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Config, Connection, Pool, Runtime};
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::{
    ports::{JobQueue, Pop},
    DomainError,
};

pub type RedisPool = Pool;

pub mod queues {
    pub const LISTING_QUEUE: &str = "jobs:listing_embedding";
    pub const USER_QUEUE: &str = "jobs:user_embedding";
}

/// How long `pop` blocks per BRPOP before re-checking `close`.
const BLOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// BRPOP reads a zero timeout as "block forever".
const MIN_BLOCK_SECS: f64 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis pool error: {0}")]
    Pool(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<QueueError> for DomainError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Serialization(e) => DomainError::internal(format!("job encoding: {e}")),
            other => DomainError::external(other.to_string()),
        }
    }
}

pub fn create_pool(redis_url: &str) -> Result<RedisPool, QueueError> {
    let cfg = Config::from_url(redis_url);
    cfg.create_pool(Some(Runtime::Tokio1))
        .map_err(|e| QueueError::Pool(e.to_string()))
}

/// JSON jobs in a Redis list: LPUSH to enqueue, BRPOP to consume.
pub struct RedisQueue<T> {
    pool: RedisPool,
    key: String,
    capacity: usize,
    poll_interval: Duration,
    closed: AtomicBool,
    _job: PhantomData<fn() -> T>,
}

impl<T> RedisQueue<T> {
    pub fn new(pool: RedisPool, key: impl Into<String>, capacity: usize) -> Self {
        Self {
            pool,
            key: key.into(),
            capacity: capacity.max(1),
            poll_interval: Duration::from_millis(250),
            closed: AtomicBool::new(false),
            _job: PhantomData,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn conn(&self) -> Result<Connection, QueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| QueueError::Pool(e.to_string()))
    }

    async fn list_len(&self, conn: &mut Connection) -> Result<usize, QueueError> {
        conn.llen(&self.key)
            .await
            .map_err(|e| QueueError::Redis(e.to_string()))
    }
}

fn decode<T: DeserializeOwned>(json: &str) -> Result<T, QueueError> {
    Ok(serde_json::from_str(json)?)
}

#[async_trait]
impl<T> JobQueue<T> for RedisQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn push(&self, job: T) -> Result<(), DomainError> {
        if self.is_closed() {
            return Err(DomainError::QueueClosed);
        }
        let payload = serde_json::to_string(&job).map_err(QueueError::from)?;
        let mut conn = self.conn().await?;

        // backpressure: wait for the consumer while the list is full
        while self.list_len(&mut conn).await? >= self.capacity {
            if self.is_closed() {
                return Err(DomainError::QueueClosed);
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        conn.lpush::<_, _, ()>(&self.key, payload)
            .await
            .map_err(|e| QueueError::Redis(e.to_string()))?;

        tracing::debug!(queue = %self.key, "job queued");
        Ok(())
    }

    async fn pop(&self) -> Result<Option<T>, DomainError> {
        loop {
            match self.pop_within(BLOCK_TIMEOUT).await? {
                Pop::Job(job) => return Ok(Some(job)),
                Pop::Drained => return Ok(None),
                Pop::Idle => {}
            }
        }
    }

    async fn pop_within(&self, wait: Duration) -> Result<Pop<T>, DomainError> {
        if self.is_closed() {
            return Ok(match self.try_pop().await? {
                Some(job) => Pop::Job(job),
                None => Pop::Drained,
            });
        }

        let mut conn = self.conn().await?;
        let result: Option<(String, String)> = conn
            .brpop(&self.key, wait.as_secs_f64().max(MIN_BLOCK_SECS))
            .await
            .map_err(|e| QueueError::Redis(e.to_string()))?;

        match result {
            Some((_, json)) => Ok(Pop::Job(decode(&json)?)),
            None => Ok(Pop::Idle),
        }
    }

    async fn try_pop(&self) -> Result<Option<T>, DomainError> {
        let mut conn = self.conn().await?;
        let result: Option<String> = conn
            .rpop(&self.key, None)
            .await
            .map_err(|e| QueueError::Redis(e.to_string()))?;

        Ok(result.map(|json| decode(&json)).transpose()?)
    }

    async fn len(&self) -> Result<usize, DomainError> {
        let mut conn = self.conn().await?;
        Ok(self.list_len(&mut conn).await?)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ListingJob, ListingRef, UserJob};

    #[tokio::test]
    async fn test_closed_queue_rejects_without_connecting() {
        let pool = create_pool("redis://127.0.0.1:6379").unwrap();
        let queue: RedisQueue<UserJob> = RedisQueue::new(pool, queues::USER_QUEUE, 10);
        queue.close();

        let err = queue.push(UserJob::new(7)).await.unwrap_err();
        assert!(matches!(err, DomainError::QueueClosed));
    }

    #[test]
    fn test_jobs_survive_json_encoding() {
        let job = ListingJob::new(ListingRef {
            id: 12,
            title: "Alternator".to_string(),
        });
        let json = serde_json::to_string(&job).unwrap();
        assert_eq!(decode::<ListingJob>(&json).unwrap(), job);
        assert!(decode::<ListingJob>("{").is_err());
    }

    #[test]
    fn test_queue_errors_map_to_domain_errors() {
        let redis: DomainError = QueueError::Redis("connection refused".into()).into();
        assert!(matches!(redis, DomainError::ExternalService(_)));
        assert!(redis.is_retryable());

        let serde_err = serde_json::from_str::<UserJob>("nope").unwrap_err();
        let encoding: DomainError = QueueError::from(serde_err).into();
        assert!(matches!(encoding, DomainError::Internal(_)));
    }
}
