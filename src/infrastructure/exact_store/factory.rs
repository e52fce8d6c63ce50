//! Exact-match store factory for runtime selection

use std::sync::Arc;

use crate::config::ExactStoreConfig;
use crate::domain::{DomainError, ExactMatchStore, SemanticCacheConfig};

use super::in_memory::InMemoryExactStore;
use super::redis::RedisExactStore;

/// Supported exact-match store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExactStoreType {
    /// In-memory store using moka
    #[default]
    InMemory,
    Redis,
}

impl std::fmt::Display for ExactStoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory => write!(f, "in_memory"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for ExactStoreType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            _ => Err(DomainError::configuration(format!(
                "Unknown exact store type: {}. Valid types: in_memory, redis",
                s
            ))),
        }
    }
}

/// Create the exact-match store described by the configuration
pub async fn create_exact_store(
    config: &ExactStoreConfig,
    cache: &SemanticCacheConfig,
) -> Result<Arc<dyn ExactMatchStore>, DomainError> {
    let store_type: ExactStoreType = config.store_type.parse()?;

    let store: Arc<dyn ExactMatchStore> = match store_type {
        ExactStoreType::InMemory => Arc::new(InMemoryExactStore::new(
            cache.ttl(),
            cache.max_entries as u64,
        )),
        ExactStoreType::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                DomainError::configuration("Redis URL is required for the redis exact store")
            })?;

            Arc::new(RedisExactStore::connect(url, config.key_prefix.clone(), cache.ttl()).await?)
        }
    };

    tracing::info!(store = %store_type, "Exact-match store configured");

    Ok(store)
}
