//! Lookup path: exact match first, then scoped similarity search
//!
//! Every failure on this path degrades to a miss. Nothing here returns an
//! error to the caller.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::cache::{
    CacheHit, EntryHash, ExactMatchStore, LookupOutcome, LookupState, LookupTrace, MissReason,
    ScoredEntry, SemanticCacheConfig, SimilarityQuery, VectorIndex,
};
use crate::domain::request::{normalize, validate_request, NormalizedRequest, RenderParams};
use crate::infrastructure::embedding::EmbeddingClient;
use crate::infrastructure::observability::record_discarded_candidates;

use super::recency::RecencyRefresher;

/// Decides whether a cached artifact satisfies a request
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    exact_store: Arc<dyn ExactMatchStore>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: EmbeddingClient,
    recency: RecencyRefresher,
    config: SemanticCacheConfig,
}

impl DecisionEngine {
    pub fn new(
        exact_store: Arc<dyn ExactMatchStore>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: EmbeddingClient,
        config: SemanticCacheConfig,
    ) -> Self {
        let recency = RecencyRefresher::new(Arc::clone(&vector_index));

        Self {
            exact_store,
            vector_index,
            embedder,
            recency,
            config,
        }
    }

    pub fn config(&self) -> &SemanticCacheConfig {
        &self.config
    }

    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    pub async fn lookup(&self, prompt: &str, params: &RenderParams, model_id: &str) -> LookupOutcome {
        self.lookup_traced(prompt, params, model_id).await.0
    }

    /// Run a lookup and return the state path it took
    pub async fn lookup_traced(
        &self,
        prompt: &str,
        params: &RenderParams,
        model_id: &str,
    ) -> (LookupOutcome, LookupTrace) {
        let mut trace = LookupTrace::new();

        if !self.config.enabled {
            return (miss(&mut trace, MissReason::Disabled), trace);
        }

        if let Err(e) = validate_request(prompt, params, model_id) {
            debug!(error = %e, "Rejected cache lookup");
            return (miss(&mut trace, MissReason::InvalidRequest), trace);
        }

        let request = normalize(prompt, params, model_id);
        advance(&mut trace, LookupState::NormalizeDone);

        let outcome = self.decide(&request, &mut trace).await;

        match &outcome {
            LookupOutcome::Hit(hit) => debug!(
                bucket = request.resolution_bucket(),
                model_id = request.model_id(),
                kind = hit.kind.as_str(),
                similarity = hit.similarity,
                "Media cache hit"
            ),
            LookupOutcome::Miss(reason) => debug!(
                bucket = request.resolution_bucket(),
                model_id = request.model_id(),
                reason = %reason,
                "Media cache miss"
            ),
        }

        (outcome, trace)
    }

    async fn decide(&self, request: &NormalizedRequest, trace: &mut LookupTrace) -> LookupOutcome {
        let hash = request.hash();

        if let Some(hit) = self.check_exact(&hash).await {
            advance(trace, LookupState::ExactChecked);
            advance(trace, LookupState::Hit);
            return LookupOutcome::Hit(hit);
        }
        advance(trace, LookupState::ExactChecked);

        let scope = match request.scope() {
            Ok(scope) => scope,
            Err(e) => {
                warn!(error = %e, "Normalized request has no valid scope");
                return miss(trace, MissReason::InvalidRequest);
            }
        };

        advance(trace, LookupState::EmbeddingPending);

        let embedding = match self.embedder.embed(request.canonical_text()).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(
                    hash = %hash,
                    kind = e.kind(),
                    error = %e,
                    "Embedding unavailable, semantic lookup skipped"
                );
                return miss(trace, MissReason::EmbeddingUnavailable);
            }
        };

        let query = SimilarityQuery::new(
            embedding,
            scope,
            self.embedder.embedding_version(),
            self.config.top_k,
        );

        let candidates = match timeout(self.config.index_timeout(), self.vector_index.query(&query)).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                warn!(
                    index = self.vector_index.index_name(),
                    error = %e,
                    "Vector index query failed"
                );
                return miss(trace, MissReason::IndexUnavailable);
            }
            Err(_) => {
                warn!(
                    index = self.vector_index.index_name(),
                    timeout_ms = self.config.index_timeout_ms,
                    "Vector index query timed out"
                );
                return miss(trace, MissReason::IndexUnavailable);
            }
        };

        advance(trace, LookupState::VectorChecked);

        let Some(best) = best_candidate(&query, candidates) else {
            return miss(trace, MissReason::NoCandidates);
        };

        if best.similarity < self.config.threshold() {
            return miss(trace, MissReason::BelowThreshold { best: best.similarity });
        }

        self.recency.refresh(best.entry.hash().clone());
        advance(trace, LookupState::Hit);

        LookupOutcome::Hit(CacheHit::semantic(
            best.entry.artifact_ref().clone(),
            best.similarity,
            best.entry.hash().clone(),
        ))
    }

    /// An exact-store failure or timeout is treated as "not found"
    async fn check_exact(&self, hash: &EntryHash) -> Option<CacheHit> {
        match timeout(self.config.exact_timeout(), self.exact_store.get(hash)).await {
            Ok(Ok(found)) => found.map(|artifact_ref| CacheHit::exact(artifact_ref, hash.clone())),
            Ok(Err(e)) => {
                warn!(
                    store = self.exact_store.store_name(),
                    error = %e,
                    "Exact-match lookup failed"
                );
                None
            }
            Err(_) => {
                warn!(
                    store = self.exact_store.store_name(),
                    timeout_ms = self.config.exact_timeout_ms,
                    "Exact-match lookup timed out"
                );
                None
            }
        }
    }
}

/// Highest-ranked candidate that is actually comparable with the query
///
/// Adapters already filter by scope and version; anything that slips through
/// is dropped here rather than returned as a hit.
fn best_candidate(query: &SimilarityQuery, candidates: Vec<ScoredEntry>) -> Option<ScoredEntry> {
    let mut discarded = 0;
    let mut best: Option<ScoredEntry> = None;

    for candidate in candidates {
        if !query.accepts(&candidate.entry) || !candidate.similarity.is_finite() {
            discarded += 1;
            continue;
        }

        let better = match &best {
            None => true,
            Some(current) => {
                candidate.similarity > current.similarity
                    || (candidate.similarity == current.similarity
                        && candidate.entry.cached_at() > current.entry.cached_at())
            }
        };

        if better {
            best = Some(candidate);
        }
    }

    if discarded > 0 {
        warn!(count = discarded, "Discarded incompatible candidates from index result");
        record_discarded_candidates("invalid_candidate", discarded);
    }

    best
}

fn advance(trace: &mut LookupTrace, next: LookupState) {
    if let Err(e) = trace.advance(next) {
        warn!(error = %e, "Unexpected lookup state transition");
    }
}

fn miss(trace: &mut LookupTrace, reason: MissReason) -> LookupOutcome {
    advance(trace, LookupState::Miss);
    LookupOutcome::Miss(reason)
}
