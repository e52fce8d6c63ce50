//! Cache domain: entries, scoped queries, store and index traits, verdicts

mod config;
mod entry;
mod index;
mod outcome;
mod query;
mod stats;
mod store;

pub use config::{RetryConfig, SemanticCacheConfig};
pub use entry::{ArtifactRef, CacheEntry, EntryHash};
pub use index::{UpsertOutcome, VectorIndex};
pub use outcome::{
    CacheHit, LookupOutcome, LookupResult, LookupState, LookupTrace, MatchKind, MissReason,
};
pub use query::{rank_candidates, ScopeFilter, ScoredEntry, SimilarityQuery};
pub use stats::{CacheStats, StatsRecorder};
pub use store::ExactMatchStore;

#[cfg(test)]
pub use index::mock::MockVectorIndex;
#[cfg(test)]
pub use store::mock::MockExactStore;
