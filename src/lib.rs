//! PMP Media Cache
//!
//! A semantic cache placed in front of a generative-media backend:
//! - Exact reuse through a content hash of the normalized request
//! - Approximate reuse through embedding similarity, scoped by resolution and model
//! - Background write-back of new artifacts with bounded retries
//! - In-memory, Redis and pgvector backends selected by configuration

pub mod config;
pub mod domain;
pub mod infrastructure;

use std::sync::Arc;

pub use config::AppConfig;
pub use domain::{
    ArtifactRef, CacheStats, DomainError, LookupOutcome, LookupResult, MissReason,
    RenderParams, SemanticCacheConfig,
};
pub use infrastructure::logging::init_logging;
pub use infrastructure::services::{MediaCacheService, WriteReport, WriteStatus};

/// Create the cache service from `config/default`, `config/local` and the environment
pub async fn create_media_cache() -> Result<Arc<MediaCacheService>, DomainError> {
    let config = AppConfig::load()
        .map_err(|e| DomainError::configuration(format!("Failed to load configuration: {}", e)))?;

    create_media_cache_with_config(&config).await
}

/// Create the cache service with custom configuration
pub async fn create_media_cache_with_config(
    config: &AppConfig,
) -> Result<Arc<MediaCacheService>, DomainError> {
    Ok(Arc::new(MediaCacheService::from_config(config).await?))
}
