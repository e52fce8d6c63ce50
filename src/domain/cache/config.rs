//! Semantic cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded retry policy with exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    2000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    pub fn with_max_delay(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate delay before retry number `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = delay.min(self.max_delay_ms as f64) as u64;

        Duration::from_millis(delay_ms)
    }
}

/// Configuration for the lookup and write paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    /// When disabled every lookup misses and writes are skipped
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Minimum cosine similarity for a semantic hit (0.0 to 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Number of candidates fetched from the vector index
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Time-to-live for cached entries in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Capacity bound; least recently used entries are reclaimed past it
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_exact_timeout_ms")]
    pub exact_timeout_ms: u64,

    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,

    #[serde(default = "default_index_timeout_ms")]
    pub index_timeout_ms: u64,

    /// Overall budget for a single lookup
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Period of the background sweep purging expired and over-capacity
    /// entries; 0 disables it
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Retry policy for each store write
    #[serde(default)]
    pub write_retry: RetryConfig,
}

fn default_enabled() -> bool {
    true
}

fn default_similarity_threshold() -> f32 {
    0.85
}

fn default_top_k() -> usize {
    5
}

fn default_ttl_secs() -> u64 {
    86_400
}

fn default_max_entries() -> usize {
    100_000
}

fn default_exact_timeout_ms() -> u64 {
    25
}

fn default_embedding_timeout_ms() -> u64 {
    300
}

fn default_index_timeout_ms() -> u64 {
    100
}

fn default_lookup_timeout_ms() -> u64 {
    750
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            exact_timeout_ms: default_exact_timeout_ms(),
            embedding_timeout_ms: default_embedding_timeout_ms(),
            index_timeout_ms: default_index_timeout_ms(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            write_retry: RetryConfig::default(),
        }
    }
}

impl SemanticCacheConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get TTL as Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn exact_timeout(&self) -> Duration {
        Duration::from_millis(self.exact_timeout_ms)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Threshold clamped to [0, 1] regardless of how the config was loaded
    pub fn threshold(&self) -> f32 {
        if self.similarity_threshold.is_nan() {
            return default_similarity_threshold();
        }
        self.similarity_threshold.clamp(0.0, 1.0)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the similarity threshold
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_exact_timeout(mut self, timeout: Duration) -> Self {
        self.exact_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_embedding_timeout(mut self, timeout: Duration) -> Self {
        self.embedding_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_index_timeout(mut self, timeout: Duration) -> Self {
        self.index_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_write_retry(mut self, retry: RetryConfig) -> Self {
        self.write_retry = retry;
        self
    }

    /// Background sweep period, `None` when sweeping is disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = interval.as_millis() as u64;
        self
    }
}
