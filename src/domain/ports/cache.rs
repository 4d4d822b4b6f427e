use std::fmt;

use serde::Serialize;

use crate::domain::{Embedding, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Normalized search text.
    Query,
    /// Per-user interest vectors.
    User,
    /// Site-level fallback vectors, keyed by campaign.
    Site,
}

impl CacheTier {
    pub const ALL: [CacheTier; 3] = [CacheTier::Query, CacheTier::User, CacheTier::Site];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::User => "user",
            Self::Site => "site",
        }
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn query_key(text: &str) -> String {
    text.trim().to_string()
}

pub fn user_key(user_id: UserId) -> String {
    format!("user_{user_id}")
}

pub fn site_key(campaign: &str) -> String {
    format!("site_{campaign}")
}

/// Tiered, in-process embedding cache. Lookups never touch the network.
pub trait EmbeddingCache: Send + Sync {
    fn get(&self, tier: CacheTier, key: &str) -> Option<Embedding>;

    /// Stores with the tier's TTL. Returns `false` if the entry was rejected.
    fn set(&self, tier: CacheTier, key: &str, vector: Embedding) -> bool;
}
