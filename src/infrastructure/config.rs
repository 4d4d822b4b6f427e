use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

const DEFAULT_DIMENSION: usize = 768;
const DEFAULT_MAX_COST_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub embedding: EmbeddingConfig,
    pub qdrant: QdrantConfig,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub personalization: PersonalizationConfig,
    pub site: SiteConfig,
    pub search: SearchConfig,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "gemini-embedding-001".to_string(),
            dimension: DEFAULT_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub dimension: usize,
    pub skip_compatibility_check: bool,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "listings".to_string(),
            dimension: DEFAULT_DIMENSION,
            skip_compatibility_check: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub ttl_seconds: u64,
    pub max_cost_bytes: u64,
}

impl TierConfig {
    pub fn new(ttl_seconds: u64, max_cost_bytes: u64) -> Self {
        Self {
            ttl_seconds,
            max_cost_bytes,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self::new(3600, DEFAULT_MAX_COST_BYTES)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub query: TierConfig,
    pub user: TierConfig,
    pub site: TierConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            query: TierConfig::new(60 * 60, DEFAULT_MAX_COST_BYTES),
            user: TierConfig::new(24 * 60 * 60, DEFAULT_MAX_COST_BYTES),
            site: TierConfig::new(6 * 60 * 60, DEFAULT_MAX_COST_BYTES),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    #[default]
    Channel,
    Redis,
}

impl std::str::FromStr for QueueBackend {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "channel" => Ok(Self::Channel),
            "redis" => Ok(Self::Redis),
            other => Err(DomainError::validation(format!(
                "unknown queue backend '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub redis_url: String,
    pub listing_capacity: usize,
    pub user_capacity: usize,
    pub redis_poll_interval_ms: u64,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.redis_poll_interval_ms.max(1))
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Channel,
            redis_url: "redis://localhost:6379".to_string(),
            listing_capacity: 100,
            user_capacity: 1000,
            redis_poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub listing_chunk_size: usize,
    pub listing_sleep_ms: u64,
    pub user_max_attempts: u32,
    pub user_backoff_base_ms: u64,
    pub user_backoff_max_ms: u64,
    /// Longest a worker waits on an empty queue before checking for shutdown.
    pub poll_wait_ms: u64,
}

impl WorkerConfig {
    pub fn listing_sleep(&self) -> Duration {
        Duration::from_millis(self.listing_sleep_ms)
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms.max(1))
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped at max.
    pub fn user_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .user_backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.user_backoff_max_ms);
        Duration::from_millis(delay)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listing_chunk_size: 50,
            listing_sleep_ms: 1000,
            user_max_attempts: 5,
            user_backoff_base_ms: 1000,
            user_backoff_max_ms: 300_000,
            poll_wait_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalizationConfig {
    pub signal_limit: usize,
    pub bookmark_weight: f32,
    pub click_weight: f32,
    pub search_weight: f32,
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            signal_limit: 10,
            bookmark_weight: 3.0,
            click_weight: 2.0,
            search_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub campaign: String,
    pub top_listings: usize,
    pub preference_weight: f32,
    pub base_weight: f32,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            campaign: "default".to_string(),
            top_listings: 50,
            preference_weight: 1.5,
            base_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub score_threshold: f32,
    pub page_size: usize,
    /// Page size of the first page, before the user has scrolled.
    pub initial_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            page_size: 20,
            initial_k: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub listing_instruction: String,
    pub site_preference: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            listing_instruction: "Encode the following listing for semantic search. Focus on the \
                title and description, what the part is, which vehicles it fits, where it is \
                located, its price, how many rocks have been thrown at it, and any detail \
                relevant to a buyer."
                .to_string(),
            site_preference: "Show me high-quality listings with fewer reported issues (rocks \
                thrown). I prefer reliable, trustworthy listings."
                .to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the YAML file at `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, DomainError> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        tracing::debug!(
            collection = %config.qdrant.collection,
            backend = ?config.queue.backend,
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, DomainError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::validation(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, DomainError> {
        serde_yml::from_str(raw)
            .map_err(|e| DomainError::validation(format!("config is malformed: {e}")))
    }

    /// Overlays environment variables, read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("QDRANT_URL") {
            self.qdrant.url = url;
        }
        if let Some(key) = lookup("QDRANT_API_KEY") {
            self.qdrant.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(collection) = lookup("QDRANT_COLLECTION") {
            self.qdrant.collection = collection;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.queue.redis_url = url;
        }
        if let Some(backend) = lookup("QUEUE_BACKEND") {
            self.queue.backend = backend.parse()?;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(dimension) = lookup("EMBEDDING_DIMENSION") {
            let dimension: usize = dimension.trim().parse().map_err(|_| {
                DomainError::validation(format!("EMBEDDING_DIMENSION '{dimension}' is invalid"))
            })?;
            self.embedding.dimension = dimension;
            self.qdrant.dimension = dimension;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let positive_counts = [
            ("embedding.dimension", self.embedding.dimension),
            ("qdrant.dimension", self.qdrant.dimension),
            ("queue.listing_capacity", self.queue.listing_capacity),
            ("queue.user_capacity", self.queue.user_capacity),
            ("worker.listing_chunk_size", self.worker.listing_chunk_size),
            ("personalization.signal_limit", self.personalization.signal_limit),
            ("site.top_listings", self.site.top_listings),
            ("search.page_size", self.search.page_size),
        ];
        for (name, value) in positive_counts {
            if value == 0 {
                return Err(DomainError::validation(format!("{name} must be greater than 0")));
            }
        }

        let weights = [
            ("personalization.bookmark_weight", self.personalization.bookmark_weight),
            ("personalization.click_weight", self.personalization.click_weight),
            ("personalization.search_weight", self.personalization.search_weight),
            ("site.preference_weight", self.site.preference_weight),
            ("site.base_weight", self.site.base_weight),
        ];
        for (name, weight) in weights {
            if !(weight.is_finite() && weight > 0.0) {
                return Err(DomainError::validation(format!(
                    "{name} must be positive, got {weight}"
                )));
            }
        }

        if self.worker.user_max_attempts == 0 {
            return Err(DomainError::validation(
                "worker.user_max_attempts must be greater than 0",
            ));
        }

        if self.embedding.dimension != self.qdrant.dimension {
            return Err(DomainError::validation(format!(
                "embedding.dimension ({}) does not match qdrant.dimension ({})",
                self.embedding.dimension, self.qdrant.dimension
            )));
        }

        if !(0.0..=1.0).contains(&self.search.score_threshold) {
            return Err(DomainError::validation(format!(
                "search.score_threshold must be between 0.0 and 1.0, got {}",
                self.search.score_threshold
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cache.query.ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.user.ttl(), Duration::from_secs(86_400));
        assert_eq!(config.cache.site.ttl(), Duration::from_secs(21_600));
        assert_eq!(config.worker.listing_chunk_size, 50);
    }

    #[test]
    fn test_yaml_overrides_only_given_fields() {
        let config = AppConfig::from_yaml(
            "qdrant:\n  collection: ads\nworker:\n  listing_chunk_size: 10\n",
        )
        .unwrap();

        assert_eq!(config.qdrant.collection, "ads");
        assert_eq!(config.qdrant.dimension, 768);
        assert_eq!(config.worker.listing_chunk_size, 10);
        assert_eq!(config.worker.listing_sleep_ms, 1000);
        assert_eq!(config.worker.poll_wait(), Duration::from_secs(1));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("QDRANT_URL", "http://qdrant:6334"),
            ("QUEUE_BACKEND", "redis"),
            ("EMBEDDING_DIMENSION", "1536"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.qdrant.url, "http://qdrant:6334");
        assert_eq!(config.queue.backend, QueueBackend::Redis);
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.qdrant.dimension, 1536);
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|key| (key == "QUEUE_BACKEND").then(|| "kafka".to_string()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.queue.listing_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.personalization.click_weight = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.qdrant.dimension = 1536;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_user_backoff_doubles_and_caps() {
        let worker = WorkerConfig::default();
        assert_eq!(worker.user_backoff(1), Duration::from_millis(1000));
        assert_eq!(worker.user_backoff(2), Duration::from_millis(2000));
        assert_eq!(worker.user_backoff(4), Duration::from_millis(8000));
        assert_eq!(worker.user_backoff(30), Duration::from_millis(300_000));
    }
}
