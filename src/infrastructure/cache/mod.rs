//! Cost-bounded, TTL-aware embedding caches, one per purpose.
//!
//! Each tier is an LRU ordered map guarded by a mutex. An entry costs the byte size of its vector;
//! inserting past the tier budget evicts least-recently-used entries until the new one fits.
//! Expired entries are dropped lazily when they are looked up or pushed out by eviction.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;

use crate::domain::{
    ports::{self, CacheTier},
    Embedding,
};
use crate::infrastructure::config::{CacheConfig, TierConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub sets_rejected: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub cost_added: u64,
    pub cost_evicted: u64,
    pub memory_used: u64,
    pub entries: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }

    /// Flat metric-name to value view for exporters.
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("hits", self.hits as f64),
            ("misses", self.misses as f64),
            ("sets", self.sets as f64),
            ("sets_rejected", self.sets_rejected as f64),
            ("evictions", self.evictions as f64),
            ("expirations", self.expirations as f64),
            ("cost_added", self.cost_added as f64),
            ("cost_evicted", self.cost_evicted as f64),
            ("memory_used", self.memory_used as f64),
            ("entries", self.entries as f64),
            ("hit_rate", self.hit_rate()),
        ])
    }
}

struct Entry {
    vector: Embedding,
    cost: u64,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct TierState {
    entries: LruCache<String, Entry>,
    used: u64,
    stats: CacheStats,
}

impl TierState {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.pop(key)?;
        self.used -= entry.cost;
        Some(entry)
    }

    fn evict_lru(&mut self, now: Instant) -> bool {
        let Some((_, entry)) = self.entries.pop_lru() else {
            return false;
        };
        self.used -= entry.cost;
        if entry.is_expired(now) {
            self.stats.expirations += 1;
        } else {
            self.stats.evictions += 1;
            self.stats.cost_evicted += entry.cost;
        }
        true
    }
}

/// One cache tier with its own TTL and cost budget.
pub struct TierCache {
    tier: CacheTier,
    config: TierConfig,
    state: Mutex<TierState>,
}

impl TierCache {
    pub fn new(tier: CacheTier, config: TierConfig) -> Self {
        Self {
            tier,
            config,
            state: Mutex::new(TierState {
                entries: LruCache::unbounded(),
                used: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TierState> {
        // every mutation keeps `used` consistent before it can panic
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Embedding> {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;

        let lookup = state
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.vector.clone()));

        match lookup {
            Some(Some(vector)) => {
                state.stats.hits += 1;
                Some(vector)
            }
            Some(None) => {
                state.remove(key);
                state.stats.expirations += 1;
                state.stats.misses += 1;
                None
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Inserts with the tier's TTL and the vector's byte size as cost.
    pub fn set(&self, key: impl Into<String>, vector: Embedding) -> bool {
        let cost = vector.byte_size();
        self.set_with(key, vector, cost, self.config.ttl())
    }

    /// Returns `false` when the entry was rejected: zero cost or TTL, or a cost above the budget.
    pub fn set_with(
        &self,
        key: impl Into<String>,
        vector: Embedding,
        cost: u64,
        ttl: Duration,
    ) -> bool {
        let key = key.into();
        let now = Instant::now();
        let mut state = self.lock();

        if cost == 0 || ttl.is_zero() || cost > self.config.max_cost_bytes {
            state.stats.sets_rejected += 1;
            tracing::debug!(tier = %self.tier, key = %key, cost, "cache set rejected");
            return false;
        }

        state.remove(&key);
        while state.used + cost > self.config.max_cost_bytes {
            if !state.evict_lru(now) {
                break;
            }
        }

        state.entries.put(
            key,
            Entry {
                vector,
                cost,
                expires_at: now + ttl,
            },
        );
        state.used += cost;
        state.stats.sets += 1;
        state.stats.cost_added += cost;
        true
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.used = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            memory_used: state.used,
            entries: state.entries.len() as u64,
            ..state.stats
        }
    }
}

/// The three embedding cache tiers.
pub struct TieredEmbeddingCache {
    query: TierCache,
    user: TierCache,
    site: TierCache,
}

impl TieredEmbeddingCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            query: TierCache::new(CacheTier::Query, config.query),
            user: TierCache::new(CacheTier::User, config.user),
            site: TierCache::new(CacheTier::Site, config.site),
        }
    }

    pub fn tier(&self, tier: CacheTier) -> &TierCache {
        match tier {
            CacheTier::Query => &self.query,
            CacheTier::User => &self.user,
            CacheTier::Site => &self.site,
        }
    }

    pub fn set_with(
        &self,
        tier: CacheTier,
        key: impl Into<String>,
        vector: Embedding,
        cost: u64,
        ttl: Duration,
    ) -> bool {
        self.tier(tier).set_with(key, vector, cost, ttl)
    }

    pub fn clear(&self, tier: CacheTier) {
        self.tier(tier).clear();
        tracing::info!(tier = %tier, "embedding cache cleared");
    }

    pub fn clear_all(&self) {
        for tier in CacheTier::ALL {
            self.clear(tier);
        }
    }

    pub fn stats(&self, tier: CacheTier) -> CacheStats {
        self.tier(tier).stats()
    }

    pub fn stats_all(&self) -> BTreeMap<&'static str, CacheStats> {
        CacheTier::ALL
            .into_iter()
            .map(|tier| (tier.as_str(), self.stats(tier)))
            .collect()
    }
}

impl ports::EmbeddingCache for TieredEmbeddingCache {
    fn get(&self, tier: CacheTier, key: &str) -> Option<Embedding> {
        self.tier(tier).get(key)
    }

    fn set(&self, tier: CacheTier, key: &str, vector: Embedding) -> bool {
        self.tier(tier).set(key, vector)
    }
}

impl Default for TieredEmbeddingCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{query_key, site_key, user_key, EmbeddingCache};

    fn vector(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_tiers_are_isolated() {
        let cache = TieredEmbeddingCache::default();
        cache.set(CacheTier::Query, "42", vector(&[1.0, 2.0]));

        assert!(cache.get(CacheTier::User, "42").is_none());
        assert!(cache.get(CacheTier::Site, "42").is_none());
        assert_eq!(cache.get(CacheTier::Query, "42"), Some(vector(&[1.0, 2.0])));
    }

    #[test]
    fn test_hits_and_misses_are_counted() {
        let cache = TieredEmbeddingCache::default();
        cache.set(CacheTier::Query, "brake pads", vector(&[0.5; 4]));

        cache.get(CacheTier::Query, "brake pads");
        cache.get(CacheTier::Query, "rotors");

        let stats = cache.stats(CacheTier::Query);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.memory_used, 16);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.to_map()["hit_rate"], 0.5);
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let tier = TierCache::new(CacheTier::User, TierConfig::new(3600, 1024));
        tier.set_with("user_1", vector(&[1.0]), 4, Duration::from_millis(20));
        assert!(tier.get("user_1").is_some());

        std::thread::sleep(Duration::from_millis(40));

        assert!(tier.get("user_1").is_none());
        let stats = tier.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.memory_used, 0);
    }

    #[test]
    fn test_cost_budget_evicts_least_recently_used() {
        // room for two 2-float vectors
        let tier = TierCache::new(CacheTier::Query, TierConfig::new(3600, 16));
        tier.set("a", vector(&[1.0, 1.0]));
        tier.set("b", vector(&[2.0, 2.0]));
        tier.get("a");
        tier.set("c", vector(&[3.0, 3.0]));

        assert!(tier.get("a").is_some());
        assert!(tier.get("b").is_none());
        assert!(tier.get("c").is_some());

        let stats = tier.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.cost_evicted, 8);
        assert_eq!(stats.memory_used, 16);
    }

    #[test]
    fn test_oversized_or_empty_entries_are_rejected() {
        let tier = TierCache::new(CacheTier::Site, TierConfig::new(3600, 8));
        assert!(!tier.set("big", vector(&[1.0, 2.0, 3.0])));
        assert!(!tier.set("empty", vector(&[])));
        assert!(tier.get("big").is_none());
        assert_eq!(tier.stats().sets_rejected, 2);
    }

    #[test]
    fn test_overwrite_replaces_cost() {
        let tier = TierCache::new(CacheTier::Query, TierConfig::new(3600, 64));
        tier.set("k", vector(&[1.0, 2.0, 3.0, 4.0]));
        tier.set("k", vector(&[1.0]));
        assert_eq!(tier.stats().memory_used, 4);
        assert_eq!(tier.get("k"), Some(vector(&[1.0])));
    }

    #[test]
    fn test_clear_all() {
        let cache = TieredEmbeddingCache::default();
        cache.set(CacheTier::Query, &query_key("  wheels "), vector(&[1.0]));
        cache.set(CacheTier::User, &user_key(7), vector(&[1.0]));
        cache.set(CacheTier::Site, &site_key("default"), vector(&[1.0]));

        cache.clear_all();

        let all = cache.stats_all();
        assert_eq!(all.len(), 3);
        assert!(all.values().all(|stats| stats.entries == 0));
        assert!(cache.get(CacheTier::Query, "wheels").is_none());
    }
}
