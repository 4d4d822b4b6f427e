use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::domain::{
    ports::{JobQueue, Pop},
    DomainError,
};

/// In-process bounded queue over a tokio mpsc channel.
pub struct ChannelQueue<T> {
    sender: Mutex<Option<mpsc::Sender<T>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<T>>,
    len: AtomicUsize,
}

impl<T: Send + 'static> ChannelQueue<T> {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            len: AtomicUsize::new(0),
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<T>, DomainError> {
        let guard = self
            .sender
            .lock()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        guard.clone().ok_or(DomainError::QueueClosed)
    }
}

#[async_trait]
impl<T: Send + 'static> JobQueue<T> for ChannelQueue<T> {
    async fn push(&self, job: T) -> Result<(), DomainError> {
        let sender = self.sender()?;
        // counted before the send so a racing pop never sees more items than `len`
        self.len.fetch_add(1, Ordering::SeqCst);
        if sender.send(job).await.is_err() {
            self.len.fetch_sub(1, Ordering::SeqCst);
            return Err(DomainError::QueueClosed);
        }
        Ok(())
    }

    async fn pop(&self) -> Result<Option<T>, DomainError> {
        let job = self.receiver.lock().await.recv().await;
        if job.is_some() {
            self.len.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(job)
    }

    async fn pop_within(&self, wait: Duration) -> Result<Pop<T>, DomainError> {
        let mut receiver = self.receiver.lock().await;
        // mpsc recv is cancel-safe, so timing out never drops a received job
        match tokio::time::timeout(wait, receiver.recv()).await {
            Ok(Some(job)) => {
                self.len.fetch_sub(1, Ordering::SeqCst);
                Ok(Pop::Job(job))
            }
            Ok(None) => Ok(Pop::Drained),
            Err(_) => Ok(Pop::Idle),
        }
    }

    async fn try_pop(&self) -> Result<Option<T>, DomainError> {
        match self.receiver.lock().await.try_recv() {
            Ok(job) => {
                self.len.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(job))
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize, DomainError> {
        Ok(self.len.load(Ordering::SeqCst))
    }

    fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order_and_len() {
        let queue = ChannelQueue::new(10);
        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);

        assert_eq!(queue.pop().await.unwrap(), Some(1));
        assert_eq!(queue.try_pop().await.unwrap(), Some(2));
        assert_eq!(queue.try_pop().await.unwrap(), None);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_push_blocks_at_capacity() {
        let queue = Arc::new(ChannelQueue::new(1));
        queue.push(1).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.pop().await.unwrap(), Some(1));
        producer.await.unwrap().unwrap();
        assert_eq!(queue.pop().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = ChannelQueue::new(4);
        queue.push("a").await.unwrap();
        queue.close();

        assert!(matches!(queue.push("b").await, Err(DomainError::QueueClosed)));
        assert_eq!(queue.pop().await.unwrap(), Some("a"));
        assert_eq!(queue.pop().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pop_within_reports_idle_job_and_drained() {
        let queue = ChannelQueue::new(4);
        let wait = Duration::from_millis(10);
        assert_eq!(queue.pop_within(wait).await.unwrap(), Pop::Idle);

        queue.push(3).await.unwrap();
        assert_eq!(queue.pop_within(wait).await.unwrap(), Pop::Job(3));
        assert_eq!(queue.len().await.unwrap(), 0);

        queue.close();
        assert_eq!(queue.pop_within(wait).await.unwrap(), Pop::Drained);
    }
}
