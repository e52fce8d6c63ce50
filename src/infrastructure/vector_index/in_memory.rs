//! In-memory vector index

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::cache::{
    rank_candidates, CacheEntry, EntryHash, ScoredEntry, SimilarityQuery, UpsertOutcome,
    VectorIndex,
};
use crate::domain::embedding::cosine_similarity;
use crate::domain::DomainError;
use crate::infrastructure::observability::record_discarded_candidates;

/// `(resolution_bucket, model_id)`
type ScopeKey = (String, String);

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    /// Logical clock value of the last insert or hit
    last_used: u64,
}

#[derive(Debug, Default)]
struct IndexState {
    partitions: HashMap<ScopeKey, HashMap<EntryHash, Slot>>,
    scope_of: HashMap<EntryHash, ScopeKey>,
    /// Last-use tick to hash, oldest first
    recency: BTreeMap<u64, EntryHash>,
    clock: u64,
}

impl IndexState {
    fn len(&self) -> usize {
        self.scope_of.len()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn slot(&self, hash: &EntryHash) -> Option<&Slot> {
        self.scope_of
            .get(hash)
            .and_then(|scope| self.partitions.get(scope))
            .and_then(|partition| partition.get(hash))
    }

    fn insert(&mut self, entry: CacheEntry) {
        let scope = (
            entry.resolution_bucket().to_string(),
            entry.model_id().to_string(),
        );
        let hash = entry.hash().clone();
        let last_used = self.tick();

        self.recency.insert(last_used, hash.clone());
        self.scope_of.insert(hash.clone(), scope.clone());
        self.partitions
            .entry(scope)
            .or_default()
            .insert(hash, Slot { entry, last_used });
    }

    fn remove(&mut self, hash: &EntryHash) -> Option<CacheEntry> {
        let scope = self.scope_of.remove(hash)?;
        let partition = self.partitions.get_mut(&scope)?;
        let slot = partition.remove(hash);

        if partition.is_empty() {
            self.partitions.remove(&scope);
        }

        slot.map(|s| {
            self.recency.remove(&s.last_used);
            s.entry
        })
    }

    fn touch(&mut self, hash: &EntryHash) {
        let Some(scope) = self.scope_of.get(hash) else {
            return;
        };
        let now = self.clock + 1;

        let Some(slot) = self
            .partitions
            .get_mut(scope)
            .and_then(|partition| partition.get_mut(hash))
        else {
            return;
        };

        let previous = std::mem::replace(&mut slot.last_used, now);
        self.clock = now;
        self.recency.remove(&previous);
        self.recency.insert(now, hash.clone());
    }

    fn remove_where(&mut self, predicate: impl Fn(&CacheEntry) -> bool) -> usize {
        let doomed: Vec<EntryHash> = self
            .partitions
            .values()
            .flat_map(|partition| partition.values())
            .filter(|slot| predicate(&slot.entry))
            .map(|slot| slot.entry.hash().clone())
            .collect();

        for hash in &doomed {
            self.remove(hash);
        }

        doomed.len()
    }

    fn evict_least_recent(&mut self) -> Option<EntryHash> {
        let (_, hash) = self.recency.pop_first()?;
        self.remove(&hash);
        Some(hash)
    }
}

/// Vector index held in process memory
///
/// Entries are partitioned by scope, so a query only ever scans its own
/// bucket and model. Expired entries are skipped by queries and purged by
/// `evict_expired`. Past `max_entries` the least recently used entry is
/// reclaimed, found through an ordered recency map rather than a scan.
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    state: RwLock<IndexState>,
    ttl: Duration,
    max_entries: usize,
}

impl InMemoryVectorIndex {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn make_room(&self, state: &mut IndexState) {
        while state.len() >= self.max_entries {
            let Some(victim) = state.evict_least_recent() else {
                break;
            };
            tracing::debug!(hash = %victim, "Evicted least recently used entry");
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, DomainError> {
        let mut state = self.state.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;

        let now = Utc::now();

        if let Some(existing) = state.slot(entry.hash()).map(|slot| &slot.entry) {
            let reusable = !existing.is_expired_at(self.ttl, now)
                && existing.embedding_version() == entry.embedding_version();

            if reusable {
                return Ok(UpsertOutcome::AlreadyPresent);
            }

            state.remove(entry.hash());
        }

        self.make_room(&mut state);
        state.insert(entry);

        Ok(UpsertOutcome::Inserted)
    }

    async fn query(&self, query: &SimilarityQuery) -> Result<Vec<ScoredEntry>, DomainError> {
        let state = self.state.read().map_err(|e| {
            DomainError::internal(format!("Failed to acquire read lock: {}", e))
        })?;

        let scope = (
            query.scope().resolution_bucket().to_string(),
            query.scope().model_id().to_string(),
        );

        let Some(partition) = state.partitions.get(&scope) else {
            return Ok(Vec::new());
        };

        let now = Utc::now();
        let mut incompatible = 0;

        let mut candidates: Vec<ScoredEntry> = partition
            .values()
            .map(|slot| &slot.entry)
            .filter(|entry| !entry.is_expired_at(self.ttl, now))
            .filter(|entry| {
                let accepted = query.accepts(entry);
                if !accepted {
                    incompatible += 1;
                }
                accepted
            })
            .map(|entry| {
                let similarity = cosine_similarity(query.embedding(), entry.embedding());
                ScoredEntry::new(entry.clone(), similarity)
            })
            .collect();

        if incompatible > 0 {
            tracing::warn!(
                bucket = query.scope().resolution_bucket(),
                model_id = query.scope().model_id(),
                count = incompatible,
                "Discarded candidates with incompatible embeddings"
            );
            record_discarded_candidates("incompatible_embedding", incompatible);
        }

        rank_candidates(&mut candidates);
        candidates.truncate(query.top_k());

        Ok(candidates)
    }

    async fn contains(
        &self,
        hash: &EntryHash,
        embedding_version: &str,
    ) -> Result<bool, DomainError> {
        let state = self.state.read().map_err(|e| {
            DomainError::internal(format!("Failed to acquire read lock: {}", e))
        })?;

        let now = Utc::now();

        Ok(state.slot(hash).is_some_and(|slot| {
            !slot.entry.is_expired_at(self.ttl, now)
                && slot.entry.embedding_version() == embedding_version
        }))
    }

    async fn touch(&self, hash: &EntryHash) -> Result<(), DomainError> {
        self.touch_many(std::slice::from_ref(hash)).await
    }

    async fn touch_many(&self, hashes: &[EntryHash]) -> Result<(), DomainError> {
        let mut state = self.state.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;

        for hash in hashes {
            state.touch(hash);
        }

        Ok(())
    }

    async fn remove(&self, hash: &EntryHash) -> Result<bool, DomainError> {
        let mut state = self.state.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;

        Ok(state.remove(hash).is_some())
    }

    async fn remove_by_model(&self, model_id: &str) -> Result<usize, DomainError> {
        let mut state = self.state.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;

        Ok(state.remove_where(|entry| entry.model_id() == model_id))
    }

    async fn evict_expired(&self) -> Result<usize, DomainError> {
        let mut state = self.state.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;

        let now = Utc::now();
        let ttl = self.ttl;

        Ok(state.remove_where(|entry| entry.is_expired_at(ttl, now)))
    }

    async fn size(&self) -> Result<usize, DomainError> {
        let state = self.state.read().map_err(|e| {
            DomainError::internal(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(state.len())
    }

    fn index_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::{ArtifactRef, ScopeFilter};

    fn entry(text: &str, bucket: &str, model: &str, embedding: Vec<f32>) -> CacheEntry {
        CacheEntry::restore(
            EntryHash::compute(text, bucket, model),
            embedding,
            "v1",
            ArtifactRef::new(format!("ref-{}", text)),
            bucket,
            model,
            Utc::now(),
        )
    }

    fn query(bucket: &str, model: &str, embedding: Vec<f32>) -> SimilarityQuery {
        SimilarityQuery::new(embedding, ScopeFilter::new(bucket, model).unwrap(), "v1", 5)
    }

    fn index() -> InMemoryVectorIndex {
        InMemoryVectorIndex::new(Duration::from_secs(3600), 100)
    }

    #[tokio::test]
    async fn test_upsert_and_query() {
        let index = index();
        index
            .upsert(entry("close", "512x512", "sdxl", vec![1.0, 0.1, 0.0]))
            .await
            .unwrap();
        index
            .upsert(entry("far", "512x512", "sdxl", vec![0.0, 1.0, 0.0]))
            .await
            .unwrap();

        let results = index
            .query(&query("512x512", "sdxl", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.artifact_ref().as_str(), "ref-close");
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn test_bucket_isolation() {
        let index = index();
        index
            .upsert(entry("square", "1024x1024", "sdxl", vec![1.0, 0.0]))
            .await
            .unwrap();

        let results = index
            .query(&query("768x1024", "sdxl", vec![1.0, 0.0]))
            .await
            .unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_model_isolation() {
        let index = index();
        index
            .upsert(entry("a", "512x512", "sdxl", vec![1.0, 0.0]))
            .await
            .unwrap();

        let results = index
            .query(&query("512x512", "flux", vec![1.0, 0.0]))
            .await
            .unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_incompatible_version_and_dimensions_discarded() {
        let index = index();
        let other_version = CacheEntry::restore(
            EntryHash::compute("old", "512x512", "sdxl"),
            vec![1.0, 0.0],
            "v0",
            ArtifactRef::new("ref-old"),
            "512x512",
            "sdxl",
            Utc::now(),
        );
        index.upsert(other_version).await.unwrap();
        index
            .upsert(entry("short", "512x512", "sdxl", vec![1.0]))
            .await
            .unwrap();

        let results = index
            .query(&query("512x512", "sdxl", vec![1.0, 0.0]))
            .await
            .unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_same_hash_is_noop() {
        let index = index();
        let first = entry("a", "512x512", "sdxl", vec![1.0, 0.0]);

        assert_eq!(index.upsert(first.clone()).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(index.upsert(first).await.unwrap(), UpsertOutcome::AlreadyPresent);
        assert_eq!(index.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_top_k_limit() {
        let index = index();
        for i in 0..10 {
            index
                .upsert(entry(&format!("e{}", i), "512x512", "sdxl", vec![1.0, i as f32 * 0.1]))
                .await
                .unwrap();
        }

        let scope = ScopeFilter::new("512x512", "sdxl").unwrap();
        let results = index
            .query(&SimilarityQuery::new(vec![1.0, 0.0], scope, "v1", 3))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].entry.artifact_ref().as_str(), "ref-e0");
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible_and_evicted() {
        let index = InMemoryVectorIndex::new(Duration::from_secs(60), 100);
        let stale = entry("stale", "512x512", "sdxl", vec![1.0])
            .with_cached_at(Utc::now() - chrono::Duration::seconds(120));
        index.upsert(stale.clone()).await.unwrap();
        index
            .upsert(entry("fresh", "512x512", "sdxl", vec![1.0]))
            .await
            .unwrap();

        let results = index.query(&query("512x512", "sdxl", vec![1.0])).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!index.contains(stale.hash(), "v1").await.unwrap());

        assert_eq!(index.evict_expired().await.unwrap(), 1);
        assert_eq!(index.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_can_be_replaced() {
        let index = InMemoryVectorIndex::new(Duration::from_secs(60), 100);
        let stale = entry("a", "512x512", "sdxl", vec![1.0])
            .with_cached_at(Utc::now() - chrono::Duration::seconds(120));
        index.upsert(stale).await.unwrap();

        let outcome = index
            .upsert(entry("a", "512x512", "sdxl", vec![1.0]))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(index.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_capacity_reclaims_least_recently_used() {
        let index = InMemoryVectorIndex::new(Duration::from_secs(3600), 2);
        let a = entry("a", "512x512", "sdxl", vec![1.0]);
        let b = entry("b", "512x512", "sdxl", vec![1.0]);
        let c = entry("c", "512x512", "sdxl", vec![1.0]);

        index.upsert(a.clone()).await.unwrap();
        index.upsert(b.clone()).await.unwrap();
        index.touch(a.hash()).await.unwrap();
        index.upsert(c.clone()).await.unwrap();

        assert_eq!(index.size().await.unwrap(), 2);
        assert!(index.contains(a.hash(), "v1").await.unwrap());
        assert!(!index.contains(b.hash(), "v1").await.unwrap());
        assert!(index.contains(c.hash(), "v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_repeated_touches_keep_recency_order() {
        let index = InMemoryVectorIndex::new(Duration::from_secs(3600), 3);
        let [a, b, c, d, e] = ["a", "b", "c", "d", "e"]
            .map(|text| entry(text, "512x512", "sdxl", vec![1.0]));

        index.upsert(a.clone()).await.unwrap();
        index.upsert(b.clone()).await.unwrap();
        index.upsert(c.clone()).await.unwrap();
        index.touch(a.hash()).await.unwrap();
        index.touch_many(&[b.hash().clone(), a.hash().clone()]).await.unwrap();

        index.upsert(d.clone()).await.unwrap();
        assert!(!index.contains(c.hash(), "v1").await.unwrap());

        index.upsert(e.clone()).await.unwrap();
        assert!(!index.contains(b.hash(), "v1").await.unwrap());

        for kept in [&a, &d, &e] {
            assert!(index.contains(kept.hash(), "v1").await.unwrap());
        }

        let state = index.state.read().unwrap();
        assert_eq!(state.recency.len(), 3);
        assert_eq!(state.len(), 3);
    }

    #[tokio::test]
    async fn test_touching_unknown_hash_is_ignored() {
        let index = index();
        index.upsert(entry("a", "512x512", "sdxl", vec![1.0])).await.unwrap();

        index
            .touch(&EntryHash::compute("missing", "512x512", "sdxl"))
            .await
            .unwrap();

        assert_eq!(index.state.read().unwrap().recency.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_entry_from_other_embedding_version() {
        let index = index();
        let old = entry("a", "512x512", "sdxl", vec![1.0, 0.0]);
        let new = CacheEntry::restore(
            old.hash().clone(),
            vec![0.0, 1.0],
            "v2",
            ArtifactRef::new("ref-a"),
            "512x512",
            "sdxl",
            Utc::now(),
        );
        index.upsert(old.clone()).await.unwrap();

        assert!(!index.contains(old.hash(), "v2").await.unwrap());
        assert_eq!(index.upsert(new).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(index.size().await.unwrap(), 1);

        let scope = ScopeFilter::new("512x512", "sdxl").unwrap();
        let results = index
            .query(&SimilarityQuery::new(vec![0.0, 1.0], scope, "v2", 5))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].similarity > 0.99);
    }

    #[tokio::test]
    async fn test_remove_by_model() {
        let index = index();
        index.upsert(entry("a", "512x512", "sdxl", vec![1.0])).await.unwrap();
        index.upsert(entry("b", "1024x1024", "sdxl", vec![1.0])).await.unwrap();
        index.upsert(entry("c", "512x512", "flux", vec![1.0])).await.unwrap();

        assert_eq!(index.remove_by_model("sdxl").await.unwrap(), 2);
        assert_eq!(index.size().await.unwrap(), 1);
    }
}
