//! Vector index trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use super::{CacheEntry, EntryHash, ScoredEntry, SimilarityQuery};
use crate::domain::DomainError;

/// Result of adding an entry to the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A live entry with the same hash and embedding version exists; the
    /// index was left unchanged
    AlreadyPresent,
}

/// Nearest-neighbor index over cache entry embeddings
///
/// Every query is scoped to one resolution bucket and model. Implementations
/// must never return entries outside the query's scope, embedding version or
/// vector length.
#[async_trait]
pub trait VectorIndex: Send + Sync + Debug {
    /// Insert an entry unless a live one with the same hash and embedding
    /// version exists
    ///
    /// An expired entry, or one embedded under another version, is replaced.
    async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, DomainError>;

    /// Return up to `top_k` candidates, best first
    async fn query(&self, query: &SimilarityQuery) -> Result<Vec<ScoredEntry>, DomainError>;

    /// Whether a live entry with this hash was embedded under `embedding_version`
    async fn contains(&self, hash: &EntryHash, embedding_version: &str)
        -> Result<bool, DomainError>;

    /// Record a use of the entry for recency-based eviction
    async fn touch(&self, hash: &EntryHash) -> Result<(), DomainError>;

    /// Record a use of several entries at once
    async fn touch_many(&self, hashes: &[EntryHash]) -> Result<(), DomainError> {
        for hash in hashes {
            self.touch(hash).await?;
        }
        Ok(())
    }

    /// Remove an entry by hash
    async fn remove(&self, hash: &EntryHash) -> Result<bool, DomainError>;

    /// Remove every entry produced for a model, returning how many were removed
    async fn remove_by_model(&self, model_id: &str) -> Result<usize, DomainError>;

    /// Purge entries older than the configured TTL
    async fn evict_expired(&self) -> Result<usize, DomainError>;

    /// Number of indexed entries
    async fn size(&self) -> Result<usize, DomainError>;

    /// Backend name for logs and metrics
    fn index_name(&self) -> &'static str;
}
