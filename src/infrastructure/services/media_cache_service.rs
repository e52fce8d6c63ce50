//! Media cache service
//!
//! The surface the request-handling layer talks to: `lookup` before paying
//! for a generation, `store` after one completes.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::domain::cache::{
    ArtifactRef, CacheStats, ExactMatchStore, LookupOutcome, LookupResult, MissReason,
    SemanticCacheConfig, StatsRecorder, VectorIndex,
};
use crate::domain::request::{normalize, validate_request, RenderParams};
use crate::domain::DomainError;
use crate::infrastructure::embedding::{create_embedding_client, EmbeddingClient};
use crate::infrastructure::exact_store::create_exact_store;
use crate::infrastructure::observability::{record_eviction, record_lookup};
use crate::infrastructure::vector_index::create_vector_index;

use super::cache_writer::{CacheWriter, WriteReport};
use super::decision_engine::DecisionEngine;

/// Semantic cache in front of a generative-media backend
///
/// Built explicitly from its collaborators; hold it in an `Arc` and share it
/// between request handlers. A background sweep, when started, is stopped
/// when the service is dropped.
#[derive(Debug)]
pub struct MediaCacheService {
    engine: DecisionEngine,
    writer: CacheWriter,
    exact_store: Arc<dyn ExactMatchStore>,
    vector_index: Arc<dyn VectorIndex>,
    stats: StatsRecorder,
    config: SemanticCacheConfig,
    sweeper: Option<JoinHandle<()>>,
}

impl MediaCacheService {
    pub fn new(
        exact_store: Arc<dyn ExactMatchStore>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: EmbeddingClient,
        config: SemanticCacheConfig,
    ) -> Self {
        let engine = DecisionEngine::new(
            Arc::clone(&exact_store),
            Arc::clone(&vector_index),
            embedder.clone(),
            config.clone(),
        );
        let writer = CacheWriter::new(
            Arc::clone(&exact_store),
            Arc::clone(&vector_index),
            embedder,
            config.write_retry.clone(),
        );

        Self {
            engine,
            writer,
            exact_store,
            vector_index,
            stats: StatsRecorder::new(),
            config,
            sweeper: None,
        }
    }

    /// Purge expired and over-capacity entries from both stores every `interval`
    ///
    /// Must be called from within a Tokio runtime. Replaces any sweep
    /// already running.
    pub fn with_background_sweep(mut self, interval: Duration) -> Self {
        if let Some(previous) = self.sweeper.take() {
            previous.abort();
        }

        let exact_store = Arc::clone(&self.exact_store);
        let vector_index = Arc::clone(&self.vector_index);

        self.sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if let Err(e) = sweep(exact_store.as_ref(), vector_index.as_ref()).await {
                    warn!(error = %e, "Background cache sweep failed");
                }
            }
        }));

        debug!(interval_ms = interval.as_millis() as u64, "Background cache sweep started");
        self
    }

    /// Wire the embedding client, exact store and vector index from configuration
    pub async fn from_config(config: &AppConfig) -> Result<Self, DomainError> {
        let embedder = create_embedding_client(&config.embedding, &config.cache)?;
        let exact_store = create_exact_store(&config.exact_store, &config.cache).await?;
        let vector_index =
            create_vector_index(&config.vector_index, &config.cache, embedder.dimensions()).await?;

        info!(
            enabled = config.cache.enabled,
            threshold = config.cache.threshold(),
            embedding_version = embedder.embedding_version(),
            exact_store = exact_store.store_name(),
            vector_index = vector_index.index_name(),
            "Media cache initialized"
        );

        let service = Self::new(exact_store, vector_index, embedder, config.cache.clone());

        Ok(match config.cache.sweep_interval() {
            Some(interval) => service.with_background_sweep(interval),
            None => service,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &SemanticCacheConfig {
        &self.config
    }

    /// Check whether an existing artifact satisfies the request
    pub async fn lookup(&self, prompt: &str, params: &RenderParams, model_id: &str) -> LookupResult {
        LookupResult::from(&self.lookup_outcome(prompt, params, model_id).await)
    }

    /// Like `lookup`, but keeps the hit kind or miss reason
    pub async fn lookup_outcome(
        &self,
        prompt: &str,
        params: &RenderParams,
        model_id: &str,
    ) -> LookupOutcome {
        self.lookup_cancellable(prompt, params, model_id, std::future::pending::<()>())
            .await
    }

    /// Lookup that gives up with `Miss(Cancelled)` once `cancel` resolves
    ///
    /// The whole lookup is also bounded by `lookup_timeout_ms`.
    pub async fn lookup_cancellable<C>(
        &self,
        prompt: &str,
        params: &RenderParams,
        model_id: &str,
        cancel: C,
    ) -> LookupOutcome
    where
        C: Future,
    {
        let started = Instant::now();
        let budget = self.config.lookup_timeout();

        let outcome = tokio::select! {
            biased;

            _ = cancel => {
                debug!(model_id = model_id, "Lookup cancelled by caller");
                LookupOutcome::Miss(MissReason::Cancelled)
            }
            result = timeout(budget, self.engine.lookup(prompt, params, model_id)) => {
                result.unwrap_or_else(|_| {
                    warn!(
                        model_id = model_id,
                        timeout_ms = self.config.lookup_timeout_ms,
                        "Lookup exceeded its budget"
                    );
                    LookupOutcome::Miss(MissReason::Timeout)
                })
            }
        };

        self.stats.record(&outcome);
        record_lookup(&outcome, started.elapsed());

        outcome
    }

    /// Persist a freshly generated artifact in the background
    ///
    /// The write runs on its own task, so dropping the handle (or the caller
    /// going away) does not stop it.
    pub fn store(
        &self,
        prompt: &str,
        params: &RenderParams,
        model_id: &str,
        artifact_ref: impl Into<ArtifactRef>,
    ) -> JoinHandle<WriteReport> {
        let request = normalize(prompt, params, model_id);
        let artifact_ref = artifact_ref.into();

        if !self.config.enabled {
            let report = WriteReport::skipped(request.hash());
            return tokio::spawn(async move { report });
        }

        if let Err(e) = validate_request(prompt, params, model_id) {
            debug!(error = %e, "Skipping cache write for invalid request");
            let report = WriteReport::skipped(request.hash());
            return tokio::spawn(async move { report });
        }

        let writer = self.writer.clone();
        tokio::spawn(async move { writer.write(&request, artifact_ref).await })
    }

    /// Hit/miss counters plus the current index size
    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.stats.snapshot();
        stats.indexed_entries = self.vector_index.size().await.ok();
        stats
    }

    /// Sweep expired and over-capacity entries from both stores now
    pub async fn evict_expired(&self) -> Result<usize, DomainError> {
        sweep(self.exact_store.as_ref(), self.vector_index.as_ref()).await
    }

    /// Drop every indexed entry produced for a retired model
    ///
    /// Exact-store entries for the model stop being reachable once the model
    /// id is no longer requested, and expire with their TTL.
    pub async fn invalidate_model(&self, model_id: &str) -> Result<usize, DomainError> {
        let removed = self.vector_index.remove_by_model(model_id).await?;
        record_eviction(self.vector_index.index_name(), removed);

        info!(model_id = model_id, removed = removed, "Invalidated model entries");

        Ok(removed)
    }
}

impl Drop for MediaCacheService {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

async fn sweep(
    exact_store: &dyn ExactMatchStore,
    vector_index: &dyn VectorIndex,
) -> Result<usize, DomainError> {
    let indexed = vector_index.evict_expired().await?;
    record_eviction(vector_index.index_name(), indexed);

    let exact = exact_store.evict_expired().await?;
    record_eviction(exact_store.store_name(), exact);

    if indexed + exact > 0 {
        info!(vector = indexed, exact = exact, "Evicted cache entries");
    }

    Ok(indexed + exact)
}
