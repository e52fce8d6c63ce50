//! In-memory exact-match store using moka

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;

use crate::domain::cache::{ArtifactRef, EntryHash, ExactMatchStore};
use crate::domain::DomainError;

/// Thread-safe in-memory exact-match store
///
/// Entries expire after `ttl`; past `max_capacity` moka reclaims the least
/// valuable entries (LRU-style with frequency-based admission).
#[derive(Debug)]
pub struct InMemoryExactStore {
    cache: MokaCache<EntryHash, ArtifactRef>,
}

impl InMemoryExactStore {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }
}

#[async_trait]
impl ExactMatchStore for InMemoryExactStore {
    async fn get(&self, hash: &EntryHash) -> Result<Option<ArtifactRef>, DomainError> {
        Ok(self.cache.get(hash).await)
    }

    async fn put(&self, hash: &EntryHash, artifact_ref: &ArtifactRef) -> Result<bool, DomainError> {
        let entry = self
            .cache
            .entry(hash.clone())
            .or_insert(artifact_ref.clone())
            .await;

        Ok(entry.is_fresh())
    }

    async fn remove(&self, hash: &EntryHash) -> Result<bool, DomainError> {
        Ok(self.cache.remove(hash).await.is_some())
    }

    async fn evict_expired(&self) -> Result<usize, DomainError> {
        let before = self.cache.entry_count();
        self.cache.run_pending_tasks().await;
        let after = self.cache.entry_count();

        Ok(before.saturating_sub(after) as usize)
    }

    async fn size(&self) -> Result<usize, DomainError> {
        self.cache.run_pending_tasks().await;
        Ok(self.cache.entry_count() as usize)
    }

    fn store_name(&self) -> &'static str {
        "in_memory"
    }
}
