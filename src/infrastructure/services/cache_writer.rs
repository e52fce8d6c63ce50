//! Write path: persists a freshly generated artifact to both stores

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::domain::cache::{
    ArtifactRef, CacheEntry, EntryHash, ExactMatchStore, RetryConfig, UpsertOutcome, VectorIndex,
};
use crate::domain::embedding::EmbedError;
use crate::domain::request::NormalizedRequest;
use crate::domain::DomainError;
use crate::infrastructure::embedding::EmbeddingClient;
use crate::infrastructure::observability::record_write;

/// Final state of one store write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum WriteStatus {
    Written,
    /// The hash was already stored; nothing changed
    AlreadyPresent,
    /// Caching disabled or request invalid
    Skipped,
    /// Gave up after `attempts` tries
    Failed { attempts: u32 },
}

impl WriteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::AlreadyPresent => "already_present",
            Self::Skipped => "skipped",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Outcome of writing one artifact to both stores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteReport {
    pub hash: EntryHash,
    pub exact: WriteStatus,
    pub vector: WriteStatus,
}

impl WriteReport {
    pub fn skipped(hash: EntryHash) -> Self {
        Self {
            hash,
            exact: WriteStatus::Skipped,
            vector: WriteStatus::Skipped,
        }
    }

    /// Whether a later lookup for the same request can find the artifact
    pub fn is_durable(&self) -> bool {
        !self.exact.is_failed() && !self.vector.is_failed()
    }
}

/// Persists artifacts after a real generation
///
/// Failures are retried on the configured policy and then logged. Nothing
/// propagates back to the caller.
#[derive(Debug, Clone)]
pub struct CacheWriter {
    exact_store: Arc<dyn ExactMatchStore>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: EmbeddingClient,
    retry: RetryConfig,
}

impl CacheWriter {
    pub fn new(
        exact_store: Arc<dyn ExactMatchStore>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: EmbeddingClient,
        retry: RetryConfig,
    ) -> Self {
        Self {
            exact_store,
            vector_index,
            embedder,
            retry,
        }
    }

    /// Write `artifact_ref` under the request's hash and embedding
    ///
    /// The exact store and vector index are written concurrently, so an
    /// embedding outage never blocks the exact-match entry.
    pub async fn write(&self, request: &NormalizedRequest, artifact_ref: ArtifactRef) -> WriteReport {
        let hash = request.hash();

        let (exact, vector) = futures::join!(
            self.write_exact(&hash, &artifact_ref),
            self.write_vector(request, &hash, &artifact_ref),
        );

        record_write("exact", exact.as_str());
        record_write("vector", vector.as_str());

        debug!(
            hash = %hash,
            bucket = request.resolution_bucket(),
            model_id = request.model_id(),
            exact = exact.as_str(),
            vector = vector.as_str(),
            "Cache write finished"
        );

        WriteReport { hash, exact, vector }
    }

    async fn write_exact(&self, hash: &EntryHash, artifact_ref: &ArtifactRef) -> WriteStatus {
        let store = &self.exact_store;

        match self
            .run_with_retry("exact", hash, move || store.put(hash, artifact_ref))
            .await
        {
            Ok(true) => WriteStatus::Written,
            Ok(false) => WriteStatus::AlreadyPresent,
            Err(attempts) => WriteStatus::Failed { attempts },
        }
    }

    async fn write_vector(
        &self,
        request: &NormalizedRequest,
        hash: &EntryHash,
        artifact_ref: &ArtifactRef,
    ) -> WriteStatus {
        // A live entry embedded by the current model means the work can be skipped
        let version = self.embedder.embedding_version();

        match self.vector_index.contains(hash, version).await {
            Ok(true) => return WriteStatus::AlreadyPresent,
            Ok(false) => {}
            Err(e) => debug!(hash = %hash, error = %e, "Index presence check failed"),
        }

        let embedder = &self.embedder;
        let text = request.canonical_text();

        let embedding = match self
            .run_with_retry("embedding", hash, move || async move {
                embedder.embed(text).await.map_err(embed_to_domain)
            })
            .await
        {
            Ok(embedding) => embedding,
            Err(attempts) => return WriteStatus::Failed { attempts },
        };

        let entry = CacheEntry::new(request, embedding, version, artifact_ref.clone());
        let index = &self.vector_index;

        match self
            .run_with_retry("vector", hash, move || index.upsert(entry.clone()))
            .await
        {
            Ok(UpsertOutcome::Inserted) => WriteStatus::Written,
            Ok(UpsertOutcome::AlreadyPresent) => WriteStatus::AlreadyPresent,
            Err(attempts) => WriteStatus::Failed { attempts },
        }
    }

    /// Run `op` until it succeeds, fails permanently or the attempts run out
    ///
    /// Returns the number of attempts made on failure.
    async fn run_with_retry<T, F, Fut>(&self, target: &'static str, hash: &EntryHash, mut op: F) -> Result<T, u32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt - 1);
                    warn!(
                        target_store = target,
                        hash = %hash,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Cache write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        target_store = target,
                        hash = %hash,
                        attempts = attempt,
                        error = %e,
                        "Cache write abandoned"
                    );
                    return Err(attempt);
                }
            }
        }
    }
}

fn embed_to_domain(error: EmbedError) -> DomainError {
    if error.is_retryable() {
        DomainError::provider("embedding", error.to_string())
    } else {
        DomainError::validation(error.to_string())
    }
}
