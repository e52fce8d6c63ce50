//! Running hit/miss statistics

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::{LookupOutcome, MatchKind};

/// Snapshot of cache effectiveness since start-up
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub lookups: u64,
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
    /// Misses caused by an unavailable embedding model or index, or by the
    /// lookup running out of time
    pub degraded: u64,
    /// Average similarity of semantic hits
    pub avg_semantic_similarity: f32,
    /// Entries currently held by the vector index, when known
    pub indexed_entries: Option<usize>,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.exact_hits + self.semantic_hits
    }

    /// Calculate hit rate
    pub fn hit_rate(&self) -> f32 {
        if self.lookups == 0 {
            return 0.0;
        }

        self.hits() as f32 / self.lookups as f32
    }
}

/// Thread-safe accumulator behind `CacheStats`
#[derive(Debug, Default)]
pub struct StatsRecorder {
    inner: Mutex<CacheStats>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &LookupOutcome) {
        let Ok(mut stats) = self.inner.lock() else {
            return;
        };

        stats.lookups += 1;

        match outcome {
            LookupOutcome::Hit(hit) => match hit.kind {
                MatchKind::Exact => stats.exact_hits += 1,
                MatchKind::Semantic => {
                    let n = stats.semantic_hits as f32;
                    stats.avg_semantic_similarity =
                        (stats.avg_semantic_similarity * n + hit.similarity) / (n + 1.0);
                    stats.semantic_hits += 1;
                }
            },
            LookupOutcome::Miss(reason) => {
                stats.misses += 1;
                if matches!(
                    reason,
                    super::MissReason::EmbeddingUnavailable
                        | super::MissReason::IndexUnavailable
                        | super::MissReason::Timeout
                ) {
                    stats.degraded += 1;
                }
            }
        }
    }

    pub fn snapshot(&self) -> CacheStats {
        self.inner
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }
}
