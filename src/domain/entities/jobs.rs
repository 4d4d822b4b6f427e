use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ListingRef, UserId};

/// Re-embed a listing after it was created, edited or restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingJob {
    pub job_id: Uuid,
    pub listing: ListingRef,
    pub enqueued_at: DateTime<Utc>,
}

impl ListingJob {
    pub fn new(listing: ListingRef) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            listing,
            enqueued_at: Utc::now(),
        }
    }
}

/// Recompute a user's interest vector after new activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserJob {
    pub job_id: Uuid,
    pub user_id: UserId,
    /// Failed attempts so far.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl UserJob {
    pub fn new(user_id: UserId) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            user_id,
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            job_id: self.job_id,
            user_id: self.user_id,
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
        }
    }
}
